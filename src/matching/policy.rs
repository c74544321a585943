//! Donor/recipient compatibility policies.
//!
//! The policy is a pure predicate over a donor and a recipient. The matching
//! engine consults it after the availability checks; nothing here touches
//! ledger state.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::schema::MatchingConfig;
use crate::registry::types::{Donor, Recipient};

/// Reason a pair failed the compatibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Incompatibility {
    OrganMismatch,
    BloodType,
    TissueType,
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incompatibility::OrganMismatch => write!(f, "organ mismatch"),
            Incompatibility::BloodType => write!(f, "blood type"),
            Incompatibility::TissueType => write!(f, "tissue type"),
        }
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    pub failures: Vec<Incompatibility>,
}

impl Assessment {
    pub fn is_compatible(&self) -> bool {
        self.failures.is_empty()
    }

    fn require(&mut self, ok: bool, reason: Incompatibility) {
        if !ok {
            self.failures.push(reason);
        }
    }
}

/// Pluggable compatibility predicate.
pub trait CompatibilityPolicy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Check every rule and report all failures.
    fn assess(&self, donor: &Donor, recipient: &Recipient) -> Assessment;
}

/// ABO group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abo {
    O,
    A,
    B,
    AB,
}

/// Parsed blood type. Rh is optional because intake accepts free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloodGroup {
    pub abo: Abo,
    pub rh_positive: Option<bool>,
}

impl FromStr for BloodGroup {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        let (group, rh_positive) = if let Some(g) = compact.strip_suffix('+') {
            (g, Some(true))
        } else if let Some(g) = compact.strip_suffix('-') {
            (g, Some(false))
        } else if let Some(g) = compact.strip_suffix("POS") {
            (g, Some(true))
        } else if let Some(g) = compact.strip_suffix("NEG") {
            (g, Some(false))
        } else {
            (compact.as_str(), None)
        };

        let abo = match group {
            "O" | "0" => Abo::O,
            "A" => Abo::A,
            "B" => Abo::B,
            "AB" => Abo::AB,
            _ => return Err(()),
        };
        Ok(Self { abo, rh_positive })
    }
}

impl BloodGroup {
    /// Standard ABO donor→recipient table with Rh applied when both sides state it.
    pub fn can_donate_to(&self, recipient: &BloodGroup) -> bool {
        let abo_ok = match (self.abo, recipient.abo) {
            (Abo::O, _) => true,
            (Abo::A, Abo::A | Abo::AB) => true,
            (Abo::B, Abo::B | Abo::AB) => true,
            (Abo::AB, Abo::AB) => true,
            _ => false,
        };
        let rh_ok = match (self.rh_positive, recipient.rh_positive) {
            (Some(true), Some(false)) => false,
            _ => true,
        };
        abo_ok && rh_ok
    }
}

/// Blood compatibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodRule {
    #[default]
    AboRh,
    Identical,
}

/// Tissue compatibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TissueRule {
    #[default]
    SharedAntigen,
    Exact,
    Ignore,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn antigens(value: &str) -> HashSet<String> {
    value
        .split(|c: char| c == ',' || c == '/' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_uppercase())
        .collect()
}

/// Default policy: exact organ, configurable blood and tissue rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy {
    pub blood: BloodRule,
    pub tissue: TissueRule,
}

impl StandardPolicy {
    pub fn new(blood: BloodRule, tissue: TissueRule) -> Self {
        Self { blood, tissue }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.blood_rule, config.tissue_rule)
    }

    fn blood_compatible(&self, donor: &str, recipient: &str) -> bool {
        match self.blood {
            BloodRule::Identical => normalize(donor) == normalize(recipient),
            BloodRule::AboRh => match (donor.parse::<BloodGroup>(), recipient.parse::<BloodGroup>()) {
                (Ok(d), Ok(r)) => d.can_donate_to(&r),
                _ => false,
            },
        }
    }

    fn tissue_compatible(&self, donor: &str, recipient: &str) -> bool {
        match self.tissue {
            TissueRule::Ignore => true,
            TissueRule::Exact => normalize(donor) == normalize(recipient),
            TissueRule::SharedAntigen => {
                let donor = antigens(donor);
                antigens(recipient).iter().any(|a| donor.contains(a))
            }
        }
    }
}

impl CompatibilityPolicy for StandardPolicy {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn assess(&self, donor: &Donor, recipient: &Recipient) -> Assessment {
        let mut assessment = Assessment::default();
        assessment.require(
            normalize(&donor.organ) == normalize(&recipient.needed_organ),
            Incompatibility::OrganMismatch,
        );
        assessment.require(
            self.blood_compatible(&donor.blood_type, &recipient.blood_type),
            Incompatibility::BloodType,
        );
        assessment.require(
            self.tissue_compatible(&donor.tissue_type, &recipient.tissue_type),
            Incompatibility::TissueType,
        );
        assessment
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::types::{DonorId, RecipientId, UrgencyLevel};

    pub(crate) fn donor(organ: &str, blood: &str, tissue: &str) -> Donor {
        Donor {
            id: DonorId::new(),
            name: "donor".into(),
            age: 35,
            blood_type: blood.into(),
            organ: organ.into(),
            tissue_type: tissue.into(),
            is_available: true,
            registered_at: 0,
        }
    }

    pub(crate) fn recipient(organ: &str, blood: &str, tissue: &str, urgency: u32) -> Recipient {
        Recipient {
            id: RecipientId::new(),
            name: "recipient".into(),
            age: 50,
            blood_type: blood.into(),
            needed_organ: organ.into(),
            tissue_type: tissue.into(),
            urgency_level: UrgencyLevel(urgency),
            has_received: false,
            registered_at: 0,
        }
    }

    #[test]
    fn test_blood_group_parsing() {
        let o_pos: BloodGroup = "O+".parse().unwrap();
        assert_eq!(o_pos, BloodGroup { abo: Abo::O, rh_positive: Some(true) });
        let ab_neg: BloodGroup = " ab - ".parse().unwrap();
        assert_eq!(ab_neg, BloodGroup { abo: Abo::AB, rh_positive: Some(false) });
        let b: BloodGroup = "B".parse().unwrap();
        assert_eq!(b.rh_positive, None);
        assert!("C+".parse::<BloodGroup>().is_err());
        assert!("".parse::<BloodGroup>().is_err());
    }

    #[test]
    fn test_abo_table() {
        let g = |s: &str| s.parse::<BloodGroup>().unwrap();
        assert!(g("O-").can_donate_to(&g("AB+")));
        assert!(g("A+").can_donate_to(&g("AB+")));
        assert!(!g("A+").can_donate_to(&g("B+")));
        assert!(!g("AB+").can_donate_to(&g("O+")));
        // Rh+ donor into Rh- recipient
        assert!(!g("O+").can_donate_to(&g("O-")));
        assert!(g("O-").can_donate_to(&g("O+")));
        // Rh unknown on one side is not held against the pair
        assert!(g("A").can_donate_to(&g("A-")));
    }

    #[test]
    fn test_standard_policy_kidney_example() {
        let policy = StandardPolicy::default();
        let d = donor("Kidney", "O+", "A2,B7");
        let r = recipient("kidney", "O+", "B7 DR4", 5);
        assert!(policy.assess(&d, &r).is_compatible());
    }

    #[test]
    fn test_standard_policy_reports_every_failure() {
        let policy = StandardPolicy::default();
        let d = donor("Liver", "AB+", "A1");
        let r = recipient("Kidney", "O+", "B8", 5);
        let assessment = policy.assess(&d, &r);
        assert_eq!(
            assessment.failures,
            vec![
                Incompatibility::OrganMismatch,
                Incompatibility::BloodType,
                Incompatibility::TissueType
            ]
        );
    }

    #[test]
    fn test_alternative_rules() {
        let d = donor("Heart", "O+", "a2");
        let r = recipient("Heart", "A+", "A2", 3);

        let identical = StandardPolicy::new(BloodRule::Identical, TissueRule::Exact);
        assert_eq!(identical.assess(&d, &r).failures, vec![Incompatibility::BloodType]);

        let lenient = StandardPolicy::new(BloodRule::AboRh, TissueRule::Ignore);
        let mut r2 = r.clone();
        r2.tissue_type = "unrelated".into();
        assert!(lenient.assess(&d, &r2).is_compatible());
    }

    #[test]
    fn test_unparseable_blood_is_incompatible() {
        let policy = StandardPolicy::default();
        let d = donor("Lung", "unknown", "A1");
        let r = recipient("Lung", "O+", "A1", 2);
        assert_eq!(policy.assess(&d, &r).failures, vec![Incompatibility::BloodType]);
    }
}
