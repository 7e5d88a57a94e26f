use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::CrmError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub Uuid);

impl DealId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DealId {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| CrmError::validation(format!("invalid deal id `{s}`")))
    }
}

/// Pipeline position. Declaration order is the board order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Inbound,
    InitialCall,
    DealReview,
    PartnerCall,
    Memo,
    Ic,
    Investment,
    Freezer,
    Dumpster,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Inbound,
        Stage::InitialCall,
        Stage::DealReview,
        Stage::PartnerCall,
        Stage::Memo,
        Stage::Ic,
        Stage::Investment,
        Stage::Freezer,
        Stage::Dumpster,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Inbound => "Inbound Deals",
            Stage::InitialCall => "Initial Call",
            Stage::DealReview => "Deal Review",
            Stage::PartnerCall => "Partner Call",
            Stage::Memo => "Memo",
            Stage::Ic => "IC",
            Stage::Investment => "Investment",
            Stage::Freezer => "Freezer",
            Stage::Dumpster => "Dumpster",
        }
    }

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn color(self) -> &'static str {
        match self {
            Stage::Inbound => "slate",
            Stage::InitialCall => "sky",
            Stage::DealReview => "indigo",
            Stage::PartnerCall => "violet",
            Stage::Memo => "amber",
            Stage::Ic => "orange",
            Stage::Investment => "emerald",
            Stage::Freezer => "cyan",
            Stage::Dumpster => "rose",
        }
    }

    /// Freezer and Dumpster hold deals nobody is working on.
    pub fn is_inactive(self) -> bool {
        matches!(self, Stage::Freezer | Stage::Dumpster)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stage {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CrmError::validation(format!("unknown stage `{wanted}`")))
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub company: String,
    pub stage: Stage,
    pub sourcer: Option<String>,
    pub partner: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Deal {
    /// Apply a single-field change the way the backend does.
    pub fn apply(&mut self, update: &FieldUpdate, stamped: DateTime<Utc>) {
        match update {
            FieldUpdate::Company(value) => self.company = value.clone(),
            FieldUpdate::Stage(stage) => self.stage = *stage,
            FieldUpdate::Partner(value) => self.partner = value.clone(),
            FieldUpdate::Sourcer(value) => self.sourcer = value.clone(),
            FieldUpdate::Notes(value) => self.notes = value.clone(),
            FieldUpdate::Description(value) => self.description = value.clone(),
        }
        self.last_updated = Some(stamped);
    }
}

/// Everything a caller supplies to create a deal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeal {
    pub company: String,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub sourcer: Option<String>,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewDeal {
    pub fn named(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            ..Self::default()
        }
    }

    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DealField {
    Company,
    Stage,
    Partner,
    Sourcer,
    Notes,
    Description,
}

impl DealField {
    pub fn column(self) -> &'static str {
        match self {
            DealField::Company => "company",
            DealField::Stage => "stage",
            DealField::Partner => "partner",
            DealField::Sourcer => "sourcer",
            DealField::Notes => "notes",
            DealField::Description => "description",
        }
    }
}

impl FromStr for DealField {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(DealField::Company),
            "stage" => Ok(DealField::Stage),
            "partner" => Ok(DealField::Partner),
            "sourcer" => Ok(DealField::Sourcer),
            "notes" => Ok(DealField::Notes),
            "description" => Ok(DealField::Description),
            other => Err(CrmError::validation(format!("unknown field `{other}`"))),
        }
    }
}

/// A change to exactly one field of a deal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldUpdate {
    Company(String),
    Stage(Stage),
    Partner(Option<String>),
    Sourcer(Option<String>),
    Notes(Option<String>),
    Description(Option<String>),
}

impl FieldUpdate {
    /// Build an update from untyped input. An empty value clears optional fields.
    pub fn parse(field: DealField, raw: Option<&str>) -> Result<Self, CrmError> {
        let raw = raw.unwrap_or_default();
        Ok(match field {
            DealField::Company => FieldUpdate::Company(raw.to_string()),
            DealField::Stage => FieldUpdate::Stage(raw.parse()?),
            DealField::Partner => FieldUpdate::Partner(Some(raw.to_string())),
            DealField::Sourcer => FieldUpdate::Sourcer(Some(raw.to_string())),
            DealField::Notes => FieldUpdate::Notes(Some(raw.to_string())),
            DealField::Description => FieldUpdate::Description(Some(raw.to_string())),
        }
        .normalized())
    }

    pub fn field(&self) -> DealField {
        match self {
            FieldUpdate::Company(_) => DealField::Company,
            FieldUpdate::Stage(_) => DealField::Stage,
            FieldUpdate::Partner(_) => DealField::Partner,
            FieldUpdate::Sourcer(_) => DealField::Sourcer,
            FieldUpdate::Notes(_) => DealField::Notes,
            FieldUpdate::Description(_) => DealField::Description,
        }
    }

    /// Value as stored by the backends; `None` is SQL NULL.
    pub fn stored_value(&self) -> Option<String> {
        match self {
            FieldUpdate::Company(value) => Some(value.clone()),
            FieldUpdate::Stage(stage) => Some(stage.label().to_string()),
            FieldUpdate::Partner(value)
            | FieldUpdate::Sourcer(value)
            | FieldUpdate::Notes(value)
            | FieldUpdate::Description(value) => value.clone(),
        }
    }

    pub fn normalized(self) -> Self {
        match self {
            FieldUpdate::Company(value) => FieldUpdate::Company(value.trim().to_string()),
            FieldUpdate::Stage(stage) => FieldUpdate::Stage(stage),
            FieldUpdate::Partner(value) => FieldUpdate::Partner(person(value)),
            FieldUpdate::Sourcer(value) => FieldUpdate::Sourcer(person(value)),
            FieldUpdate::Notes(value) => FieldUpdate::Notes(free_text(value)),
            FieldUpdate::Description(value) => FieldUpdate::Description(free_text(value)),
        }
    }
}

/// Names are trimmed; blank means unassigned.
pub(crate) fn person(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Text is kept verbatim unless it is blank.
pub(crate) fn free_text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// People selectable as partner or sourcer. Other names are still accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster(Vec<String>);

impl TeamRoster {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for member in members {
            if let Some(name) = person(Some(member.into())) {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                    names.push(name);
                }
            }
        }
        Self(names)
    }

    pub fn members(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|member| member.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for TeamRoster {
    fn default() -> Self {
        Self::new(["Seth", "Cole", "Jameson"])
    }
}
