#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Listing, enrichment and contact record types.
//!
//! This crate defines the records that flow through the stayscout
//! pipeline: the [`ListingStub`] produced by the crawler, the
//! [`DetailFields`] and [`ContactQuery`] produced by the enrichment steps,
//! and the [`EnrichedRecord`] that is finally persisted. Missing data is
//! never represented as absence; every field carries a sentinel instead.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Placeholder for identity and contact fields that could not be found.
pub const UNKNOWN: &str = "unknown";

/// Placeholder for detail fields and for blank cells in merged datasets.
pub const NOT_AVAILABLE: &str = "N/A";

/// Column holding the listing name.
pub const COLUMN_NAME: &str = "Name";
/// Column holding the locality the listing was found under.
pub const COLUMN_CITY: &str = "City";
/// Column holding the absolute detail-page link.
pub const COLUMN_LINK: &str = "Link";
/// Column holding the truncated street address.
pub const COLUMN_ADDRESS: &str = "Address";
/// Column holding the property category.
pub const COLUMN_PROPERTY_TYPE: &str = "Property Type";
/// Single-contact email column.
pub const COLUMN_EMAIL: &str = "Email";
/// Single-contact phone column.
pub const COLUMN_PHONE: &str = "Phone Number";
/// Multi-contact email column.
pub const COLUMN_EMAILS: &str = "Emails";
/// Multi-contact phone column.
pub const COLUMN_PHONES: &str = "Phones";

/// Separator used when several contacts share one cell.
pub const CONTACT_SEPARATOR: &str = "; ";

/// Minimal identifying record for a venue found on a results page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingStub {
    /// Display name of the listing, or [`UNKNOWN`].
    pub name: String,
    /// Locality the listing was crawled for.
    pub city: String,
    /// Absolute detail-page URL, or [`UNKNOWN`] when the card had no link.
    pub detail_link: String,
}

impl ListingStub {
    /// Creates a stub, substituting [`UNKNOWN`] for a missing name or link.
    #[must_use]
    pub fn new(name: Option<String>, city: &str, detail_link: Option<String>) -> Self {
        Self {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN.to_owned()),
            city: city.to_owned(),
            detail_link: detail_link.unwrap_or_else(|| UNKNOWN.to_owned()),
        }
    }

    /// Whether the stub carries a real detail link that can be fetched.
    #[must_use]
    pub fn has_detail_link(&self) -> bool {
        self.detail_link != UNKNOWN
    }
}

/// Address and category extracted from a listing's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailFields {
    /// Street address, truncated after the country name.
    pub address: String,
    /// Property category, e.g. `"Hotel"`.
    pub property_type: String,
}

impl DetailFields {
    /// The `("N/A", "N/A")` pair used when the detail page is unusable.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            address: NOT_AVAILABLE.to_owned(),
            property_type: NOT_AVAILABLE.to_owned(),
        }
    }
}

/// Contact fields gathered for one listing across all search candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactQuery {
    /// Validated email addresses.
    pub emails: BTreeSet<String>,
    /// Normalized phone numbers.
    pub phones: BTreeSet<String>,
}

impl ContactQuery {
    /// The `{"unknown"}` / `{"unknown"}` pair.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            emails: BTreeSet::from([UNKNOWN.to_owned()]),
            phones: BTreeSet::from([UNKNOWN.to_owned()]),
        }
    }

    /// Unions another candidate's results into this one.
    pub fn absorb(&mut self, other: Self) {
        self.emails.extend(other.emails);
        self.phones.extend(other.phones);
    }

    /// Replaces each empty set with the [`UNKNOWN`] sentinel.
    #[must_use]
    pub fn or_unknown(mut self) -> Self {
        if self.emails.is_empty() {
            self.emails.insert(UNKNOWN.to_owned());
        }
        if self.phones.is_empty() {
            self.phones.insert(UNKNOWN.to_owned());
        }
        self
    }
}

/// Shape of the contact columns in the primary output.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContactColumns {
    /// `Email` / `Phone Number`, holding the first contact of each kind.
    #[default]
    First,
    /// `Emails` / `Phones`, holding every contact joined by
    /// [`CONTACT_SEPARATOR`].
    All,
}

impl ContactColumns {
    /// Column headers of the primary output in this shape.
    #[must_use]
    pub const fn headers(self) -> [&'static str; 7] {
        let (email, phone) = match self {
            Self::First => (COLUMN_EMAIL, COLUMN_PHONE),
            Self::All => (COLUMN_EMAILS, COLUMN_PHONES),
        };
        [
            COLUMN_NAME,
            COLUMN_CITY,
            COLUMN_LINK,
            COLUMN_ADDRESS,
            COLUMN_PROPERTY_TYPE,
            email,
            phone,
        ]
    }

    fn cell(self, values: &BTreeSet<String>) -> String {
        match self {
            Self::First => values
                .iter()
                .next()
                .cloned()
                .unwrap_or_else(|| UNKNOWN.to_owned()),
            Self::All => values
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(CONTACT_SEPARATOR),
        }
    }
}

/// A listing that has been through both enrichment steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Listing name.
    pub name: String,
    /// Locality the listing was crawled for.
    pub city: String,
    /// Detail-page link.
    pub detail_link: String,
    /// Street address or [`NOT_AVAILABLE`].
    pub address: String,
    /// Property category or [`NOT_AVAILABLE`].
    pub property_type: String,
    /// Never empty; `{"unknown"}` when nothing was found.
    pub emails: BTreeSet<String>,
    /// Never empty; `{"unknown"}` when nothing was found.
    pub phones: BTreeSet<String>,
}

impl EnrichedRecord {
    /// Combines a stub with its enrichment results.
    #[must_use]
    pub fn new(stub: ListingStub, detail: DetailFields, contacts: ContactQuery) -> Self {
        let contacts = contacts.or_unknown();
        Self {
            name: stub.name,
            city: stub.city,
            detail_link: stub.detail_link,
            address: detail.address,
            property_type: detail.property_type,
            emails: contacts.emails,
            phones: contacts.phones,
        }
    }

    /// Projects the record into a row matching [`ContactColumns::headers`].
    #[must_use]
    pub fn to_row(&self, columns: ContactColumns) -> Vec<String> {
        vec![
            self.name.clone(),
            self.city.clone(),
            self.detail_link.clone(),
            self.address.clone(),
            self.property_type.clone(),
            columns.cell(&self.emails),
            columns.cell(&self.phones),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> ListingStub {
        ListingStub::new(
            Some("Hotel Novecento".to_string()),
            "Venice",
            Some("https://www.booking.com/hotel/it/novecento.html".to_string()),
        )
    }

    #[test]
    fn stub_defaults_missing_fields_to_unknown() {
        let stub = ListingStub::new(None, "Venice", None);
        assert_eq!(stub.name, UNKNOWN);
        assert_eq!(stub.detail_link, UNKNOWN);
        assert!(!stub.has_detail_link());
    }

    #[test]
    fn stub_treats_blank_name_as_missing() {
        let stub = ListingStub::new(Some("   ".to_string()), "Venice", None);
        assert_eq!(stub.name, UNKNOWN);
    }

    #[test]
    fn enriched_record_never_has_empty_contacts() {
        let record = EnrichedRecord::new(
            stub(),
            DetailFields::unavailable(),
            ContactQuery::default(),
        );
        assert_eq!(record.emails, BTreeSet::from([UNKNOWN.to_string()]));
        assert_eq!(record.phones, BTreeSet::from([UNKNOWN.to_string()]));
    }

    #[test]
    fn absorb_unions_and_deduplicates() {
        let mut a = ContactQuery {
            emails: BTreeSet::from(["info@hotel.it".to_string()]),
            phones: BTreeSet::new(),
        };
        a.absorb(ContactQuery {
            emails: BTreeSet::from(["info@hotel.it".to_string(), "book@hotel.it".to_string()]),
            phones: BTreeSet::from(["+39 041 123 4567".to_string()]),
        });
        assert_eq!(a.emails.len(), 2);
        assert_eq!(a.phones.len(), 1);
    }

    #[test]
    fn first_shape_uses_singular_headers_and_first_contact() {
        let contacts = ContactQuery {
            emails: BTreeSet::from(["b@hotel.it".to_string(), "a@hotel.it".to_string()]),
            phones: BTreeSet::new(),
        };
        let record = EnrichedRecord::new(stub(), DetailFields::unavailable(), contacts);
        let headers = ContactColumns::First.headers();
        let row = record.to_row(ContactColumns::First);
        assert_eq!(headers[5], "Email");
        assert_eq!(headers[6], "Phone Number");
        assert_eq!(row[5], "a@hotel.it");
        assert_eq!(row[6], UNKNOWN);
    }

    #[test]
    fn all_shape_joins_contacts() {
        let contacts = ContactQuery {
            emails: BTreeSet::from(["b@hotel.it".to_string(), "a@hotel.it".to_string()]),
            phones: BTreeSet::from(["+39 041 123 4567".to_string()]),
        };
        let record = EnrichedRecord::new(stub(), DetailFields::unavailable(), contacts);
        let row = record.to_row(ContactColumns::All);
        assert_eq!(ContactColumns::All.headers()[5], "Emails");
        assert_eq!(row[5], "a@hotel.it; b@hotel.it");
        assert_eq!(row[3], NOT_AVAILABLE);
    }

    #[test]
    fn contact_columns_parse_from_config_strings() {
        assert_eq!("all".parse::<ContactColumns>().unwrap(), ContactColumns::All);
        assert_eq!(ContactColumns::First.to_string(), "first");
    }
}
