// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile row model, partial updates and the edit-profile form.
//!
//! Rows come back from the service loosely typed, so decoding is lenient:
//! numbers may arrive as strings, empty strings mean "not set", and
//! unparseable dates are dropped rather than failing the whole row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::models::Identity;

/// Profile stored in the `profiles` table, keyed by identity ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity ID (also the row key)
    pub id: String,
    /// Display name
    #[serde(default, deserialize_with = "de_string_or_null")]
    pub full_name: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub website: Option<String>,
    /// Calendar date, serialized as `YYYY-MM-DD`
    #[serde(default, deserialize_with = "de_opt_date")]
    pub birth_date: Option<NaiveDate>,
    /// Avatar image URL
    #[serde(default, deserialize_with = "de_opt_text")]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub balance: f64,
    /// Number of bets currently open
    #[serde(default, deserialize_with = "de_count_lenient")]
    pub bets_open: u32,
    /// Win rate in percent (0-100)
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub win_rate: f64,
    #[serde(default, deserialize_with = "de_bool_or_null")]
    pub is_verified: bool,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub last_active: Option<DateTime<Utc>>,
}

impl Profile {
    /// A bare row with only the key set, matching column defaults.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: String::new(),
            username: None,
            bio: None,
            phone: None,
            gender: None,
            location: None,
            website: None,
            birth_date: None,
            avatar_url: None,
            balance: 0.0,
            bets_open: 0,
            win_rate: 0.0,
            is_verified: false,
            created_at: None,
            updated_at: None,
            last_active: None,
        }
    }

    /// Default profile for an identity that has no row yet.
    ///
    /// `full_name` overrides the name derived from the identity metadata.
    pub fn new_default(identity: &Identity, full_name: Option<&str>, now: DateTime<Utc>) -> Self {
        let name = full_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| identity.derived_name());
        let username = identity.email_local_part();

        Self {
            full_name: name,
            username: (!username.is_empty()).then(|| username.to_string()),
            created_at: Some(now),
            updated_at: Some(now),
            last_active: Some(now),
            ..Self::empty(identity.id.clone())
        }
    }

    /// Overwrite every field present in `patch`, keeping the rest.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut self.full_name, &patch.full_name);
        set(&mut self.username, &patch.username);
        set(&mut self.bio, &patch.bio);
        set(&mut self.phone, &patch.phone);
        set(&mut self.gender, &patch.gender);
        set(&mut self.location, &patch.location);
        set(&mut self.website, &patch.website);
        set(&mut self.birth_date, &patch.birth_date);
        set(&mut self.avatar_url, &patch.avatar_url);
        set(&mut self.balance, &patch.balance);
        set(&mut self.bets_open, &patch.bets_open);
        set(&mut self.win_rate, &patch.win_rate);
        set(&mut self.is_verified, &patch.is_verified);
        if patch.created_at.is_some() {
            self.created_at = patch.created_at;
        }
        if patch.updated_at.is_some() {
            self.updated_at = patch.updated_at;
        }
        if patch.last_active.is_some() {
            self.last_active = patch.last_active;
        }
    }
}

/// Partial profile update.
///
/// `None` leaves a column alone. For nullable columns `Some(None)` clears
/// the column to null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bets_open: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    /// True when the patch would not change any column.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy of this patch stamped with `updated_at`.
    pub fn stamped(&self, now: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(now),
            ..self.clone()
        }
    }
}

impl From<&Profile> for ProfilePatch {
    /// Full overwrite of every column except the key.
    fn from(p: &Profile) -> Self {
        Self {
            full_name: Some(p.full_name.clone()),
            username: Some(p.username.clone()),
            bio: Some(p.bio.clone()),
            phone: Some(p.phone.clone()),
            gender: Some(p.gender.clone()),
            location: Some(p.location.clone()),
            website: Some(p.website.clone()),
            birth_date: Some(p.birth_date),
            avatar_url: Some(p.avatar_url.clone()),
            balance: Some(p.balance),
            bets_open: Some(p.bets_open),
            win_rate: Some(p.win_rate),
            is_verified: Some(p.is_verified),
            created_at: p.created_at,
            updated_at: p.updated_at,
            last_active: p.last_active,
        }
    }
}

/// Values entered on the edit-profile screen.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileForm {
    #[validate(custom(function = "validate_not_blank", message = "is required"))]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub website: String,
    /// `YYYY-MM-DD` or empty
    #[serde(default)]
    #[validate(custom(function = "validate_iso_date", message = "must be YYYY-MM-DD"))]
    pub birth_date: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl ProfileForm {
    /// Prefill the form from the cached profile.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.full_name.clone(),
            bio: profile.bio.clone().unwrap_or_default(),
            phone: profile.phone.clone().unwrap_or_default(),
            gender: profile.gender.clone().unwrap_or_default(),
            location: profile.location.clone().unwrap_or_default(),
            website: profile.website.clone().unwrap_or_default(),
            birth_date: profile
                .birth_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            avatar_url: profile.avatar_url.clone().unwrap_or_default(),
        }
    }

    /// Validate and convert to a patch. Empty optional fields clear the column.
    pub fn into_patch(self) -> Result<ProfilePatch, AppError> {
        self.validate()?;

        let text = |s: String| -> Option<Option<String>> {
            let s = s.trim();
            Some((!s.is_empty()).then(|| s.to_string()))
        };
        let birth_date = parse_date(&self.birth_date);

        Ok(ProfilePatch {
            full_name: Some(self.name.trim().to_string()),
            bio: text(self.bio),
            phone: text(self.phone),
            gender: text(self.gender),
            location: text(self.location),
            website: text(self.website),
            birth_date: Some(birth_date),
            avatar_url: text(self.avatar_url),
            ..Default::default()
        })
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_iso_date(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || parse_date(value).is_some() {
        return Ok(());
    }
    Err(ValidationError::new("date"))
}

/// Parse `YYYY-MM-DD`, also accepting a full timestamp whose date part is valid.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

// ─── Lenient decoding ────────────────────────────────────────────────

fn de_string_or_null<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.filter(|s| !s.trim().is_empty()))
}

fn de_bool_or_null<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

fn de_opt_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.and_then(|s| parse_date(&s)))
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.and_then(|s| parse_timestamp(&s)))
}

/// RFC3339, or a timestamp without offset (`timestamp` columns) read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn de_f64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn de_count_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = de_f64_lenient(d)?;
    if value.is_finite() && value > 0.0 {
        Ok(value.min(u32::MAX as f64) as u32)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserMetadata;
    use chrono::TimeZone;

    fn identity() -> Identity {
        Identity {
            id: "user-1".to_string(),
            email: Some("juan.cruz@example.com".to_string()),
            user_metadata: UserMetadata::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_default_profile() {
        let profile = Profile::new_default(&identity(), None, now());
        assert_eq!(profile.id, "user-1");
        assert_eq!(profile.full_name, "juan.cruz");
        assert_eq!(profile.username.as_deref(), Some("juan.cruz"));
        assert_eq!(profile.balance, 0.0);
        assert_eq!(profile.bets_open, 0);
        assert_eq!(profile.win_rate, 0.0);
        assert!(!profile.is_verified);
        assert_eq!(profile.created_at, Some(now()));
    }

    #[test]
    fn test_new_default_profile_with_full_name() {
        let profile = Profile::new_default(&identity(), Some("  Juan Cruz "), now());
        assert_eq!(profile.full_name, "Juan Cruz");
        assert_eq!(profile.username.as_deref(), Some("juan.cruz"));
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut profile = Profile::new_default(&identity(), Some("Juan"), now());
        profile.bio = Some("hello".to_string());

        profile.apply(&ProfilePatch {
            balance: Some(42.5),
            ..Default::default()
        });

        assert_eq!(profile.balance, 42.5);
        assert_eq!(profile.full_name, "Juan");
        assert_eq!(profile.bio.as_deref(), Some("hello"));
    }

    #[test]
    fn test_apply_can_clear_nullable_field() {
        let mut profile = Profile::empty("x");
        profile.bio = Some("old".to_string());
        profile.apply(&ProfilePatch {
            bio: Some(None),
            ..Default::default()
        });
        assert_eq!(profile.bio, None);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = ProfilePatch {
            balance: Some(10.0),
            bio: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "balance": 10.0, "bio": null }));
        assert!(ProfilePatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_lenient_row_decoding() {
        let row = serde_json::json!({
            "id": "user-1",
            "full_name": null,
            "bio": "",
            "balance": "600.5",
            "bets_open": 3,
            "win_rate": 58,
            "is_verified": null,
            "birth_date": "1990-05-17",
            "created_at": "2024-01-15T10:00:00.123456+00:00",
            "updated_at": "not a date"
        });

        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.full_name, "");
        assert_eq!(profile.bio, None);
        assert_eq!(profile.balance, 600.5);
        assert_eq!(profile.bets_open, 3);
        assert_eq!(profile.win_rate, 58.0);
        assert!(!profile.is_verified);
        assert_eq!(profile.birth_date, NaiveDate::from_ymd_opt(1990, 5, 17));
        assert!(profile.created_at.is_some());
        assert_eq!(profile.updated_at, None);
        assert_eq!(profile.last_active, None);
    }

    #[test]
    fn test_timestamp_without_offset_is_utc() {
        let row = serde_json::json!({
            "id": "user-1",
            "created_at": "2024-01-15T10:00:00.123456",
            "last_active": "2024-01-15 10:00:00",
        });

        let profile: Profile = serde_json::from_value(row).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(profile.last_active, Some(expected));
        assert_eq!(
            profile.created_at.map(|t| t.timestamp()),
            Some(expected.timestamp())
        );
    }

    #[test]
    fn test_form_requires_name() {
        let form = ProfileForm {
            name: "   ".to_string(),
            ..Default::default()
        };
        let err = form.into_patch().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("name")));
    }

    #[test]
    fn test_form_rejects_bad_date() {
        let form = ProfileForm {
            name: "Ana".to_string(),
            birth_date: "17/05/1990".to_string(),
            ..Default::default()
        };
        assert!(form.into_patch().is_err());
    }

    #[test]
    fn test_form_to_patch_clears_empty_fields() {
        let form = ProfileForm {
            name: " Ana ".to_string(),
            bio: "runner".to_string(),
            birth_date: "1990-05-17".to_string(),
            ..Default::default()
        };
        let patch = form.into_patch().unwrap();
        assert_eq!(patch.full_name.as_deref(), Some("Ana"));
        assert_eq!(patch.bio, Some(Some("runner".to_string())));
        assert_eq!(patch.phone, Some(None));
        assert_eq!(patch.birth_date, Some(NaiveDate::from_ymd_opt(1990, 5, 17)));
        assert_eq!(patch.username, None);
        assert_eq!(patch.balance, None);
    }

    #[test]
    fn test_form_round_trips_profile() {
        let mut profile = Profile::new_default(&identity(), Some("Juan"), now());
        profile.website = Some("https://example.com".to_string());
        let form = ProfileForm::from_profile(&profile);
        assert_eq!(form.name, "Juan");
        assert_eq!(form.website, "https://example.com");
        assert_eq!(form.bio, "");
    }
}
