use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Trial,
    Contractual,
    Makeup,
    Assessment,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Trial => "trial",
            SessionType::Contractual => "contractual",
            SessionType::Makeup => "makeup",
            SessionType::Assessment => "assessment",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "trial" => Some(SessionType::Trial),
            "contractual" => Some(SessionType::Contractual),
            "makeup" => Some(SessionType::Makeup),
            "assessment" => Some(SessionType::Assessment),
            _ => None,
        }
    }
}

impl Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
