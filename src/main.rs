// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! BetMaster session CLI
//!
//! Drives the session core from a terminal: sign in and show the profile,
//! register, edit the profile or request a password reset. Sessions are not
//! persisted, so every invocation starts signed out.

use betmaster::{
    config::{BackendKind, Config},
    models::{Profile, ProfileForm},
    time_utils::format_opt_utc,
    AppContext,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "betmaster", about = "BetMaster session and profile CLI")]
struct Cli {
    /// Backend to use (`supabase` or `memory`); defaults to BETMASTER_BACKEND
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and print the profile (created on first sign-in)
    Profile(Credentials),
    /// Create an account and its default profile
    Register {
        #[command(flatten)]
        credentials: Credentials,
        /// Full name shown on the profile
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign in and change profile fields; empty values clear a field
    Edit {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        fields: EditFields,
    },
    /// Ask for password-reset instructions by email
    ResetPassword {
        #[arg(long, env = "BETMASTER_EMAIL")]
        email: String,
    },
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "BETMASTER_EMAIL")]
    email: String,
    #[arg(long, env = "BETMASTER_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct EditFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    website: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    birth_date: Option<String>,
    #[arg(long)]
    avatar_url: Option<String>,
}

impl EditFields {
    /// Overlay the given fields on a form prefilled from the profile.
    fn apply_to(self, mut form: ProfileForm) -> ProfileForm {
        let slots = [
            (self.name, &mut form.name),
            (self.bio, &mut form.bio),
            (self.phone, &mut form.phone),
            (self.gender, &mut form.gender),
            (self.location, &mut form.location),
            (self.website, &mut form.website),
            (self.birth_date, &mut form.birth_date),
            (self.avatar_url, &mut form.avatar_url),
        ];
        for (value, slot) in slots {
            if let Some(value) = value {
                *slot = value;
            }
        }
        form
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let backend = cli
        .backend
        .as_deref()
        .map(str::parse::<BackendKind>)
        .transpose()?;

    let config = Config::load(backend)?;
    let ctx = AppContext::from_config(config)?;
    ctx.start().await;

    let result = run(&ctx, cli.command).await;

    ctx.auth.logout().await;
    ctx.shutdown();
    result
}

async fn run(ctx: &AppContext, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Profile(credentials) => {
            sign_in(ctx, &credentials).await?;
            print_profile(ctx.profiles.profile().as_ref());
        }
        Command::Register { credentials, name } => {
            ctx.auth
                .sign_up(&credentials.email, &credentials.password, name.as_deref())
                .await
                .map_err(|e| e.user_message())?;
            println!("Account created for {}", credentials.email.trim());
            print_profile(ctx.profiles.profile().as_ref());
        }
        Command::Edit {
            credentials,
            fields,
        } => {
            sign_in(ctx, &credentials).await?;
            let current = ctx
                .profiles
                .profile()
                .ok_or("Profile unavailable, try again later")?;
            let form = fields.apply_to(ProfileForm::from_profile(&current));

            let saved = ctx
                .profiles
                .save_form(form)
                .await
                .map_err(|e| e.user_message())?;
            if !saved {
                return Err("Could not update the profile. Try again.".into());
            }
            println!("Profile updated");
            print_profile(ctx.profiles.profile().as_ref());
        }
        Command::ResetPassword { email } => {
            ctx.auth
                .send_password_reset(&email)
                .await
                .map_err(|e| e.user_message())?;
            println!("Instructions sent to {}", email.trim());
        }
    }
    Ok(())
}

async fn sign_in(
    ctx: &AppContext,
    credentials: &Credentials,
) -> Result<(), Box<dyn std::error::Error>> {
    ctx.auth
        .sign_in(&credentials.email, &credentials.password)
        .await
        .map_err(|e| e.user_message())?;
    Ok(())
}

fn print_profile(profile: Option<&Profile>) {
    let Some(p) = profile else {
        println!("(no profile available)");
        return;
    };

    println!("{}", p.full_name);
    if let Some(username) = &p.username {
        println!("  @{}", username);
    }
    println!("  balance      {:.2}", p.balance);
    println!("  open bets    {}", p.bets_open);
    println!("  win rate     {:.0}%", p.win_rate);
    println!("  verified     {}", p.is_verified);
    if let Some(bio) = &p.bio {
        println!("  bio          {}", bio);
    }
    if let Some(date) = p.birth_date {
        println!("  birth date   {}", date);
    }
    println!("  member since {}", format_opt_utc(p.created_at));
    println!("  last active  {}", format_opt_utc(p.last_active));
}

/// Initialize structured JSON logging on stderr.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("betmaster=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
