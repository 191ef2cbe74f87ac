// scope.rs — Run scope: which system, which clouds, which frameworks.
//
// A RunScope pins down the boundary of one assessment run: the target
// system, the cloud providers evidence is pulled from, and the baseline
// and frameworks the system is assessed against. The scope is resolved
// once at the start of a run and never changes afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A cloud provider evidence can be collected from.
///
/// Government variants are distinct because they are separate partitions
/// with separate credentials and separate inventories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    Aws,
    AwsGov,
    Azure,
    AzureGov,
    Gcp,
    GcpGov,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudProvider::Aws => write!(f, "aws"),
            CloudProvider::AwsGov => write!(f, "aws_gov"),
            CloudProvider::Azure => write!(f, "azure"),
            CloudProvider::AzureGov => write!(f, "azure_gov"),
            CloudProvider::Gcp => write!(f, "gcp"),
            CloudProvider::GcpGov => write!(f, "gcp_gov"),
        }
    }
}

impl FromStr for CloudProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(CloudProvider::Aws),
            "aws_gov" => Ok(CloudProvider::AwsGov),
            "azure" => Ok(CloudProvider::Azure),
            "azure_gov" => Ok(CloudProvider::AzureGov),
            "gcp" => Ok(CloudProvider::Gcp),
            "gcp_gov" => Ok(CloudProvider::GcpGov),
            other => Err(format!("unknown cloud provider '{}'", other)),
        }
    }
}

/// A compliance framework a run assesses against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Fedramp,
    #[serde(rename = "nist_800_53_r5")]
    Nist80053R5,
    Rmf,
    Stig,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::Fedramp => write!(f, "fedramp"),
            Framework::Nist80053R5 => write!(f, "nist_800_53_r5"),
            Framework::Rmf => write!(f, "rmf"),
            Framework::Stig => write!(f, "stig"),
        }
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fedramp" => Ok(Framework::Fedramp),
            "nist_800_53_r5" => Ok(Framework::Nist80053R5),
            "rmf" => Ok(Framework::Rmf),
            "stig" => Ok(Framework::Stig),
            other => Err(format!("unknown framework '{}'", other)),
        }
    }
}

/// The control baseline the target system is authorized against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    FedrampLow,
    FedrampMod,
    FedrampHigh,
    Custom,
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Baseline::FedrampLow => write!(f, "fedramp_low"),
            Baseline::FedrampMod => write!(f, "fedramp_mod"),
            Baseline::FedrampHigh => write!(f, "fedramp_high"),
            Baseline::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for Baseline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fedramp_low" => Ok(Baseline::FedrampLow),
            "fedramp_mod" => Ok(Baseline::FedrampMod),
            "fedramp_high" => Ok(Baseline::FedrampHigh),
            "custom" => Ok(Baseline::Custom),
            other => Err(format!("unknown baseline '{}'", other)),
        }
    }
}

/// The resolved boundary of a single assessment run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunScope {
    /// Stable identifier of the target system (e.g., "SYS-1042").
    pub system_id: String,

    /// Human-readable system name.
    pub system_name: String,

    /// Cloud providers in scope. Never empty for a valid scope.
    pub providers: Vec<CloudProvider>,

    /// Deployment environment (production, staging, ...).
    pub environment: String,

    /// Authorization boundary description, when the system registry has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<String>,

    /// Control baseline assessed against.
    pub baseline: Baseline,

    /// Frameworks in scope for this run.
    pub frameworks: Vec<Framework>,
}

impl RunScope {
    /// Build a scope with the common defaults: production environment,
    /// FedRAMP Moderate, all four frameworks.
    pub fn new(system_id: impl Into<String>, system_name: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            system_name: system_name.into(),
            providers: vec![CloudProvider::Aws],
            environment: "production".to_string(),
            boundary: None,
            baseline: Baseline::FedrampMod,
            frameworks: vec![
                Framework::Fedramp,
                Framework::Nist80053R5,
                Framework::Rmf,
                Framework::Stig,
            ],
        }
    }

    /// Replace the provider set (builder pattern).
    pub fn with_providers(mut self, providers: Vec<CloudProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// Replace the baseline (builder pattern).
    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Replace the framework set (builder pattern).
    pub fn with_frameworks(mut self, frameworks: Vec<Framework>) -> Self {
        self.frameworks = frameworks;
        self
    }

    /// Whether the scope includes a given framework.
    pub fn has_framework(&self, framework: Framework) -> bool {
        self.frameworks.contains(&framework)
    }
}
