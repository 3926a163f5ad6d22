use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::AppError;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Open,
    Authenticated,
    Restricted,
    Embargo,
    Lease,
}

impl Visibility {
    /// Embargo and lease are schedules, not a resting visibility
    pub fn is_timed(&self) -> bool {
        matches!(self, Visibility::Embargo | Visibility::Lease)
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Open => write!(f, "open"),
            Visibility::Authenticated => write!(f, "authenticated"),
            Visibility::Restricted => write!(f, "restricted"),
            Visibility::Embargo => write!(f, "embargo"),
            Visibility::Lease => write!(f, "lease"),
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Visibility::Open),
            "authenticated" => Ok(Visibility::Authenticated),
            "restricted" => Ok(Visibility::Restricted),
            "embargo" => Ok(Visibility::Embargo),
            "lease" => Ok(Visibility::Lease),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// The attribute keys that may influence a new file set's access terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityKey {
    Visibility,
    VisibilityDuringLease,
    VisibilityAfterLease,
    LeaseExpirationDate,
    EmbargoReleaseDate,
    VisibilityDuringEmbargo,
    VisibilityAfterEmbargo,
}

impl VisibilityKey {
    pub const ALL: [VisibilityKey; 7] = [
        VisibilityKey::Visibility,
        VisibilityKey::VisibilityDuringLease,
        VisibilityKey::VisibilityAfterLease,
        VisibilityKey::LeaseExpirationDate,
        VisibilityKey::EmbargoReleaseDate,
        VisibilityKey::VisibilityDuringEmbargo,
        VisibilityKey::VisibilityAfterEmbargo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityKey::Visibility => "visibility",
            VisibilityKey::VisibilityDuringLease => "visibility_during_lease",
            VisibilityKey::VisibilityAfterLease => "visibility_after_lease",
            VisibilityKey::LeaseExpirationDate => "lease_expiration_date",
            VisibilityKey::EmbargoReleaseDate => "embargo_release_date",
            VisibilityKey::VisibilityDuringEmbargo => "visibility_during_embargo",
            VisibilityKey::VisibilityAfterEmbargo => "visibility_after_embargo",
        }
    }
}

/// Whitelisted projection of a work-attributes bag.
///
/// Values are kept exactly as supplied; validation happens when the terms are
/// applied to a file set (see [`AccessTerms::from_attributes`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityAttributes(BTreeMap<VisibilityKey, Value>);

impl VisibilityAttributes {
    /// Keep only the recognised visibility, embargo and lease keys. Everything
    /// else in `attributes` is dropped without error.
    pub fn extract(attributes: &Map<String, Value>) -> Self {
        let picked = VisibilityKey::ALL
            .iter()
            .filter_map(|key| attributes.get(key.as_str()).map(|v| (*key, v.clone())))
            .collect();
        Self(picked)
    }

    pub fn get(&self, key: VisibilityKey) -> Option<&Value> {
        self.0.get(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = VisibilityKey> + '_ {
        self.0.keys().copied()
    }

    /// Back to a plain attribute bag
    pub fn to_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }

    /// Blank strings and nulls count as absent; any other non-string is invalid.
    fn text(&self, key: VisibilityKey) -> Result<Option<&str>, AppError> {
        match self.0.get(&key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim())),
            Some(other) => Err(AppError::InvalidInput(format!(
                "{} must be a string, got {}",
                key.as_str(),
                json_kind(other)
            ))),
        }
    }

    fn visibility(&self, key: VisibilityKey) -> Result<Option<Visibility>, AppError> {
        self.text(key)?
            .map(|raw| {
                raw.parse::<Visibility>()
                    .map_err(|_| AppError::InvalidInput(format!("{}: unknown visibility '{}'", key.as_str(), raw)))
            })
            .transpose()
    }

    fn resting_visibility(
        &self,
        key: VisibilityKey,
        default: Visibility,
    ) -> Result<Visibility, AppError> {
        match self.visibility(key)? {
            None => Ok(default),
            Some(v) if v.is_timed() => Err(AppError::InvalidInput(format!(
                "{} cannot be '{}'",
                key.as_str(),
                v
            ))),
            Some(v) => Ok(v),
        }
    }

    fn date(&self, key: VisibilityKey) -> Result<Option<NaiveDate>, AppError> {
        self.text(key)?
            .map(|raw| {
                NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
                    AppError::InvalidInput(format!(
                        "{} must be a YYYY-MM-DD date, got '{}'",
                        key.as_str(),
                        raw
                    ))
                })
            })
            .transpose()
    }
}

/// Human-readable JSON type name, used in validation messages
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embargo {
    pub release_date: NaiveDate,
    pub visibility_during: Visibility,
    pub visibility_after: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub expiration_date: NaiveDate,
    pub visibility_during: Visibility,
    pub visibility_after: Visibility,
}

/// Effective access terms of a file set.
///
/// `visibility` is the visibility in force now; under an embargo or lease it is
/// the "during" value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTerms {
    pub visibility: Visibility,
    pub embargo: Option<Embargo>,
    pub lease: Option<Lease>,
}

impl AccessTerms {
    /// Terms carrying only a plain visibility
    pub fn plain(visibility: Visibility) -> Self {
        Self {
            visibility,
            embargo: None,
            lease: None,
        }
    }

    /// Validate request attributes into terms.
    ///
    /// Returns `Ok(None)` when no visibility was requested, in which case the
    /// file set inherits the work's visibility on attach. Embargo and lease
    /// dates must lie after `today`.
    pub fn from_attributes(
        attributes: &VisibilityAttributes,
        today: NaiveDate,
    ) -> Result<Option<Self>, AppError> {
        let Some(visibility) = attributes.visibility(VisibilityKey::Visibility)? else {
            return Ok(None);
        };

        match visibility {
            Visibility::Embargo => {
                let release_date = attributes
                    .date(VisibilityKey::EmbargoReleaseDate)?
                    .ok_or_else(|| {
                        AppError::InvalidInput(
                            "embargo_release_date is required when visibility is embargo"
                                .to_string(),
                        )
                    })?;
                if release_date <= today {
                    return Err(AppError::InvalidInput(format!(
                        "embargo_release_date must be in the future, got {}",
                        release_date
                    )));
                }
                let embargo = Embargo {
                    release_date,
                    visibility_during: attributes.resting_visibility(
                        VisibilityKey::VisibilityDuringEmbargo,
                        Visibility::Restricted,
                    )?,
                    visibility_after: attributes.resting_visibility(
                        VisibilityKey::VisibilityAfterEmbargo,
                        Visibility::Open,
                    )?,
                };
                Ok(Some(Self {
                    visibility: embargo.visibility_during,
                    embargo: Some(embargo),
                    lease: None,
                }))
            }
            Visibility::Lease => {
                let expiration_date = attributes
                    .date(VisibilityKey::LeaseExpirationDate)?
                    .ok_or_else(|| {
                        AppError::InvalidInput(
                            "lease_expiration_date is required when visibility is lease"
                                .to_string(),
                        )
                    })?;
                if expiration_date <= today {
                    return Err(AppError::InvalidInput(format!(
                        "lease_expiration_date must be in the future, got {}",
                        expiration_date
                    )));
                }
                let lease = Lease {
                    expiration_date,
                    visibility_during: attributes.resting_visibility(
                        VisibilityKey::VisibilityDuringLease,
                        Visibility::Open,
                    )?,
                    visibility_after: attributes.resting_visibility(
                        VisibilityKey::VisibilityAfterLease,
                        Visibility::Restricted,
                    )?,
                };
                Ok(Some(Self {
                    visibility: lease.visibility_during,
                    embargo: None,
                    lease: Some(lease),
                }))
            }
            plain => Ok(Some(Self::plain(plain))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[test]
    fn extract_drops_unrecognised_keys() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({
            "visibility": "open",
            "title": "ignored",
            "lease_expiration_date": "2030-01-01",
        })));

        assert_eq!(extracted.len(), 2);
        assert_eq!(
            Value::Object(extracted.to_map()),
            json!({"visibility": "open", "lease_expiration_date": "2030-01-01"})
        );
    }

    #[test]
    fn extract_is_idempotent() {
        let once = VisibilityAttributes::extract(&attrs(json!({
            "visibility": "embargo",
            "embargo_release_date": "2031-06-30",
            "creator": ["someone"],
        })));
        let twice = VisibilityAttributes::extract(&once.to_map());
        assert_eq!(once, twice);
    }

    #[test]
    fn extract_of_unrelated_bag_is_empty() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({"title": ["A"], "keyword": []})));
        assert!(extracted.is_empty());
    }

    #[test]
    fn no_visibility_means_no_terms() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({
            "embargo_release_date": "2030-01-01"
        })));
        assert_eq!(AccessTerms::from_attributes(&extracted, today()).unwrap(), None);
    }

    #[test]
    fn plain_visibility_becomes_terms() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({"visibility": "authenticated"})));
        assert_eq!(
            AccessTerms::from_attributes(&extracted, today()).unwrap(),
            Some(AccessTerms::plain(Visibility::Authenticated))
        );
    }

    #[test]
    fn embargo_applies_defaults() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({
            "visibility": "embargo",
            "embargo_release_date": "2030-01-01",
        })));
        let terms = AccessTerms::from_attributes(&extracted, today()).unwrap().unwrap();
        assert_eq!(terms.visibility, Visibility::Restricted);
        let embargo = terms.embargo.unwrap();
        assert_eq!(embargo.release_date, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        assert_eq!(embargo.visibility_after, Visibility::Open);
        assert!(terms.lease.is_none());
    }

    #[test]
    fn lease_honours_explicit_visibilities() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({
            "visibility": "lease",
            "lease_expiration_date": "2030-01-01",
            "visibility_during_lease": "authenticated",
            "visibility_after_lease": "restricted",
        })));
        let terms = AccessTerms::from_attributes(&extracted, today()).unwrap().unwrap();
        assert_eq!(terms.visibility, Visibility::Authenticated);
        assert_eq!(terms.lease.unwrap().visibility_after, Visibility::Restricted);
    }

    #[test]
    fn embargo_without_date_is_invalid() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({"visibility": "embargo"})));
        assert!(matches!(
            AccessTerms::from_attributes(&extracted, today()),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn past_embargo_date_is_invalid() {
        let extracted = VisibilityAttributes::extract(&attrs(json!({
            "visibility": "embargo",
            "embargo_release_date": "2020-01-01",
        })));
        assert!(AccessTerms::from_attributes(&extracted, today()).is_err());
    }

    #[test]
    fn malformed_values_are_invalid() {
        for bag in [
            json!({"visibility": "everyone"}),
            json!({"visibility": 3}),
            json!({"visibility": "lease", "lease_expiration_date": "01/01/2030"}),
            json!({"visibility": "embargo", "embargo_release_date": "2030-01-01", "visibility_after_embargo": "lease"}),
        ] {
            let extracted = VisibilityAttributes::extract(&attrs(bag.clone()));
            assert!(
                AccessTerms::from_attributes(&extracted, today()).is_err(),
                "expected {bag} to be rejected"
            );
        }
    }

    #[test]
    fn json_kind_names() {
        assert_eq!(json_kind(&json!(1)), "number");
        assert_eq!(json_kind(&json!({})), "object");
        assert_eq!(json_kind(&Value::Null), "null");
    }
}
