//! Read-only list views over a ledger snapshot.

use serde::{Deserialize, Serialize};

use crate::registry::types::{Donor, MatchRecord, Recipient};

/// Case-insensitive substring filters, AND-combined. Empty terms match all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DonorFilter {
    pub name: Option<String>,
    pub blood_type: Option<String>,
    pub organ: Option<String>,
    pub tissue_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientFilter {
    pub name: Option<String>,
    pub blood_type: Option<String>,
    /// Matched against the needed organ.
    pub organ: Option<String>,
    pub tissue_type: Option<String>,
    /// Matched against the decimal rendering of the level.
    pub urgency_level: Option<String>,
}

/// Urgency ordering. `None` keeps fetch order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencySort {
    #[default]
    None,
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

fn contains(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(n) if !n.is_empty() => haystack.to_lowercase().contains(&n.to_lowercase()),
        _ => true,
    }
}

impl DonorFilter {
    pub fn matches(&self, donor: &Donor) -> bool {
        contains(&donor.name, &self.name)
            && contains(&donor.blood_type, &self.blood_type)
            && contains(&donor.organ, &self.organ)
            && contains(&donor.tissue_type, &self.tissue_type)
    }
}

impl RecipientFilter {
    pub fn matches(&self, recipient: &Recipient) -> bool {
        contains(&recipient.name, &self.name)
            && contains(&recipient.blood_type, &self.blood_type)
            && contains(&recipient.needed_organ, &self.organ)
            && contains(&recipient.tissue_type, &self.tissue_type)
            && contains(&recipient.urgency_level.to_string(), &self.urgency_level)
    }
}

pub fn filter_donors(donors: &[Donor], filter: &DonorFilter) -> Vec<Donor> {
    donors.iter().filter(|d| filter.matches(d)).cloned().collect()
}

/// Filter, then stably sort by urgency.
pub fn filter_recipients(
    recipients: &[Recipient],
    filter: &RecipientFilter,
    sort: UrgencySort,
) -> Vec<Recipient> {
    let mut out: Vec<Recipient> = recipients
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    match sort {
        UrgencySort::None => {}
        UrgencySort::Asc => out.sort_by_key(|r| r.urgency_level),
        UrgencySort::Desc => out.sort_by(|a, b| b.urgency_level.cmp(&a.urgency_level)),
    }
    out
}

/// Dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub revision: u64,
    pub donors: usize,
    pub recipients: usize,
    pub available_donors: usize,
    pub waiting_recipients: usize,
    /// Recipients that have received an organ.
    pub matches: usize,
    pub confirmed_retrievals: usize,
}

impl RegistryStats {
    pub fn compute(
        revision: u64,
        donors: &[Donor],
        recipients: &[Recipient],
        matches: &[MatchRecord],
    ) -> Self {
        let received = recipients.iter().filter(|r| r.has_received).count();
        Self {
            revision,
            donors: donors.len(),
            recipients: recipients.len(),
            available_donors: donors.iter().filter(|d| d.is_available).count(),
            waiting_recipients: recipients.len() - received,
            matches: received,
            confirmed_retrievals: matches.iter().filter(|m| m.is_confirmed()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::policy::tests::{donor, recipient};

    fn roster() -> Vec<Recipient> {
        let mut a = recipient("Kidney", "O+", "A2", 5);
        a.name = "Amara".into();
        let mut b = recipient("Liver", "A-", "B8", 9);
        b.name = "Bello".into();
        let mut c = recipient("Kidney", "AB+", "A2", 5);
        c.name = "Chidi".into();
        let mut d = recipient("Heart", "O-", "DR4", 1);
        d.name = "Dayo".into();
        vec![a, b, c, d]
    }

    #[test]
    fn test_filters_are_case_insensitive_and_combined() {
        let mut d1 = donor("Kidney", "O+", "A2");
        d1.name = "Kemi".into();
        let mut d2 = donor("Liver", "o-", "B8");
        d2.name = "Kunle".into();
        let donors = vec![d1.clone(), d2];

        let filter = DonorFilter {
            name: Some("k".into()),
            blood_type: Some("O".into()),
            organ: Some("KID".into()),
            ..Default::default()
        };
        let out = filter_donors(&donors, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, d1.id);

        assert_eq!(filter_donors(&donors, &DonorFilter::default()).len(), 2);
    }

    #[test]
    fn test_filtering_is_monotonic() {
        let recipients = roster();
        let loose = RecipientFilter {
            organ: Some("kidney".into()),
            ..Default::default()
        };
        let strict = RecipientFilter {
            organ: Some("kidney".into()),
            blood_type: Some("ab".into()),
            ..Default::default()
        };
        let n_none = filter_recipients(&recipients, &RecipientFilter::default(), UrgencySort::None).len();
        let n_loose = filter_recipients(&recipients, &loose, UrgencySort::None).len();
        let n_strict = filter_recipients(&recipients, &strict, UrgencySort::None).len();
        assert!(n_none >= n_loose);
        assert!(n_loose >= n_strict);
        assert_eq!((n_none, n_loose, n_strict), (4, 2, 1));
    }

    #[test]
    fn test_urgency_filter_uses_decimal_text() {
        let recipients = roster();
        let filter = RecipientFilter {
            urgency_level: Some("9".into()),
            ..Default::default()
        };
        let out = filter_recipients(&recipients, &filter, UrgencySort::None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Bello");
    }

    #[test]
    fn test_sort_orders_are_reversed_and_stable() {
        let recipients = roster();
        let filter = RecipientFilter::default();

        let none: Vec<_> = filter_recipients(&recipients, &filter, UrgencySort::None)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(none, vec!["Amara", "Bello", "Chidi", "Dayo"]);

        let asc: Vec<_> = filter_recipients(&recipients, &filter, UrgencySort::Asc)
            .into_iter()
            .map(|r| r.name)
            .collect();
        // Amara and Chidi share level 5 and keep fetch order in both directions.
        assert_eq!(asc, vec!["Dayo", "Amara", "Chidi", "Bello"]);

        let desc: Vec<_> = filter_recipients(&recipients, &filter, UrgencySort::Desc)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(desc, vec!["Bello", "Amara", "Chidi", "Dayo"]);
    }

    #[test]
    fn test_stats() {
        let mut recipients = roster();
        recipients[0].has_received = true;
        let mut used = donor("Kidney", "O+", "A2");
        used.is_available = false;
        let donors = vec![used, donor("Liver", "A+", "B8")];
        let stats = RegistryStats::compute(7, &donors, &recipients, &[]);
        assert_eq!(stats.revision, 7);
        assert_eq!(stats.available_donors, 1);
        assert_eq!(stats.waiting_recipients, 3);
        assert_eq!(stats.matches, 1);
    }
}
