//! Separation settings and their RON persistence

use std::path::Path;
use std::str::FromStr;

use meshsep_kernel::TessellationParams;
use serde::{Deserialize, Serialize};

/// Which acceptance policy drives the separation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Mesher success with every face triangulated
    #[default]
    Strict,
    /// Triangulated face ratio at or above the threshold, one level at a time
    Coverage,
    /// Triangulated face ratio above the threshold at the coarsest populated level
    Diagnostic,
}

impl PolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Strict => "strict",
            PolicyKind::Coverage => "coverage",
            PolicyKind::Diagnostic => "diagnostic",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(PolicyKind::Strict),
            "coverage" | "multi-level" => Ok(PolicyKind::Coverage),
            "diagnostic" => Ok(PolicyKind::Diagnostic),
            other => Err(ConfigError::Invalid(format!("unknown policy '{}'", other))),
        }
    }
}

/// Settings for one separation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Linear tessellation tolerance
    pub deflection: f64,
    /// Angular tessellation tolerance (radians)
    pub angle: f64,
    /// Interpret `deflection` relative to the shape's size
    pub relative: bool,
    /// Allow the kernel to mesh in parallel
    pub parallel: bool,
    /// Ask the kernel to repair a unit before meshing it
    pub try_fix_before_meshing: bool,
    /// Memoize decisions by shape identity during a run
    pub use_cache: bool,
    /// Face coverage ratio used by the coverage and diagnostic policies
    pub coverage_threshold: f64,
    pub policy: PolicyKind,
    /// Number of non-meshable entries listed in the report
    pub report_limit: usize,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl SeparationConfig {
    /// Settings of the strict separator
    pub fn strict() -> Self {
        Self {
            deflection: 0.01,
            angle: 0.5,
            relative: false,
            parallel: true,
            try_fix_before_meshing: true,
            use_cache: true,
            coverage_threshold: 1.0,
            policy: PolicyKind::Strict,
            report_limit: 10,
        }
    }

    /// Settings of the multi-level (coverage threshold) exporter
    pub fn multi_level() -> Self {
        Self {
            try_fix_before_meshing: false,
            coverage_threshold: 0.8,
            policy: PolicyKind::Coverage,
            ..Self::strict()
        }
    }

    /// Settings of the high-bar diagnoser
    pub fn diagnostic() -> Self {
        Self {
            try_fix_before_meshing: false,
            coverage_threshold: 0.9,
            policy: PolicyKind::Diagnostic,
            ..Self::strict()
        }
    }

    /// Variant defaults for a policy
    pub fn for_policy(policy: PolicyKind) -> Self {
        match policy {
            PolicyKind::Strict => Self::strict(),
            PolicyKind::Coverage => Self::multi_level(),
            PolicyKind::Diagnostic => Self::diagnostic(),
        }
    }

    /// Set the linear tolerance
    pub fn with_deflection(mut self, deflection: f64) -> Self {
        self.deflection = deflection;
        self
    }

    /// Set the angular tolerance
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// Set relative deflection
    pub fn with_relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    /// Set the parallel meshing hint
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable repair before meshing
    pub fn with_repair(mut self, try_fix: bool) -> Self {
        self.try_fix_before_meshing = try_fix;
        self
    }

    /// Enable or disable the decision cache
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the coverage threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    /// Set the number of report entries
    pub fn with_report_limit(mut self, limit: usize) -> Self {
        self.report_limit = limit;
        self
    }

    /// Tolerances forwarded to the kernel
    pub fn tessellation_params(&self) -> TessellationParams {
        TessellationParams {
            linear_deflection: self.deflection,
            angular_deflection: self.angle,
            relative: self.relative,
            parallel: self.parallel,
        }
    }

    /// Check that tolerances and thresholds are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.deflection.is_finite() && self.deflection > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "deflection must be positive, got {}",
                self.deflection
            )));
        }
        if !(self.angle.is_finite() && self.angle > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "angle must be positive, got {}",
                self.angle
            )));
        }
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(ConfigError::Invalid(format!(
                "coverage threshold must be within [0, 1], got {}",
                self.coverage_threshold
            )));
        }
        Ok(())
    }

    /// Parse settings from RON text
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize settings to RON text
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Load settings from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron_str(&content)
    }

    /// Save settings to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = self.to_ron_string()?;
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Configuration-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_defaults() {
        let strict = SeparationConfig::default();
        assert_eq!(strict.policy, PolicyKind::Strict);
        assert!(strict.try_fix_before_meshing);
        assert!(strict.use_cache);
        assert_eq!(strict.report_limit, 10);
        approx::assert_relative_eq!(strict.deflection, 0.01);
        approx::assert_relative_eq!(strict.angle, 0.5);

        let coverage = SeparationConfig::multi_level();
        assert_eq!(coverage.policy, PolicyKind::Coverage);
        assert!(!coverage.try_fix_before_meshing);
        approx::assert_relative_eq!(coverage.coverage_threshold, 0.8);

        let diagnostic = SeparationConfig::for_policy(PolicyKind::Diagnostic);
        approx::assert_relative_eq!(diagnostic.coverage_threshold, 0.9);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = SeparationConfig::from_ron_str("(deflection: 0.2, policy: Coverage)").unwrap();
        approx::assert_relative_eq!(config.deflection, 0.2);
        assert_eq!(config.policy, PolicyKind::Coverage);
        assert!(config.parallel);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(SeparationConfig::strict().with_deflection(0.0).validate().is_err());
        assert!(SeparationConfig::strict().with_angle(-1.0).validate().is_err());
        assert!(SeparationConfig::strict().with_threshold(1.5).validate().is_err());
        assert!(matches!(
            SeparationConfig::from_ron_str("(coverage_threshold: 2.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SeparationConfig::from_ron_str("not ron"),
            Err(ConfigError::Deserialize(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("separation.ron");
        let config = SeparationConfig::diagnostic()
            .with_relative(true)
            .with_report_limit(3);

        config.save(&path).unwrap();
        let loaded = SeparationConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Strict".parse::<PolicyKind>().unwrap(), PolicyKind::Strict);
        assert_eq!(
            "multi-level".parse::<PolicyKind>().unwrap(),
            PolicyKind::Coverage
        );
        assert!("fastest".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_tessellation_params() {
        let params = SeparationConfig::strict()
            .with_parallel(false)
            .tessellation_params();
        approx::assert_relative_eq!(params.linear_deflection, 0.01);
        assert!(!params.parallel);
    }
}
