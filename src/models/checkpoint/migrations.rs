//! Architecture identifiers and the legacy migration table.
//!
//! Checkpoints record the architecture they were saved from under the
//! `architecture` metadata key. Older training runs saved the classifier from
//! a module that has since moved, wrapping the network under a `model.`
//! attribute; those identifiers are redirected to the current architecture
//! and their parameter names rewritten. The table is built once per process,
//! before the first checkpoint is resolved.

use crate::core::errors::LoadError;
use once_cell::sync::Lazy;
use tracing::debug;

/// Identifier of the architecture the native backend implements.
pub const CURRENT_ARCHITECTURE: &str = "app.ml.mobilenetv3.MobileNetV3Classifier";

/// Maps one legacy architecture identifier to its current location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureMigration {
    pub legacy: &'static str,
    pub current: &'static str,
    /// Prefix the legacy module put in front of every parameter name.
    pub param_prefix: Option<&'static str>,
}

/// Result of looking up a checkpoint's declared architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArchitecture {
    pub id: &'static str,
    pub strip_prefix: Option<&'static str>,
    /// The legacy identifier, when a migration was applied.
    pub migrated_from: Option<&'static str>,
}

#[derive(Debug)]
pub struct ArchitectureRegistry {
    current: &'static str,
    migrations: Vec<ArchitectureMigration>,
}

impl ArchitectureRegistry {
    fn builtin() -> Self {
        Self {
            current: CURRENT_ARCHITECTURE,
            migrations: vec![
                ArchitectureMigration {
                    legacy: "models.mobilenetv3.MobileNetV3Classifier",
                    current: CURRENT_ARCHITECTURE,
                    param_prefix: Some("model."),
                },
                ArchitectureMigration {
                    legacy: "mobilenetv3.MobileNetV3Classifier",
                    current: CURRENT_ARCHITECTURE,
                    param_prefix: Some("model."),
                },
            ],
        }
    }

    /// Looks up a declared architecture identifier.
    ///
    /// A checkpoint that declares nothing is taken to be the current
    /// architecture.
    pub fn resolve(&self, declared: Option<&str>) -> Result<ResolvedArchitecture, LoadError> {
        let Some(declared) = declared else {
            return Ok(self.current_architecture());
        };
        if declared == self.current {
            return Ok(self.current_architecture());
        }
        match self.migrations.iter().find(|m| m.legacy == declared) {
            Some(migration) => {
                debug!(
                    legacy = migration.legacy,
                    current = migration.current,
                    "applying architecture migration"
                );
                Ok(ResolvedArchitecture {
                    id: migration.current,
                    strip_prefix: migration.param_prefix,
                    migrated_from: Some(migration.legacy),
                })
            }
            None => Err(LoadError::unsupported(format!(
                "checkpoint for unknown architecture '{declared}'"
            ))),
        }
    }

    fn current_architecture(&self) -> ResolvedArchitecture {
        ResolvedArchitecture {
            id: self.current,
            strip_prefix: None,
            migrated_from: None,
        }
    }
}

static REGISTRY: Lazy<ArchitectureRegistry> = Lazy::new(|| {
    let registry = ArchitectureRegistry::builtin();
    debug!(
        migrations = registry.migrations.len(),
        "architecture migration table initialized"
    );
    registry
});

/// Returns the process-wide migration table.
pub fn architecture_registry() -> &'static ArchitectureRegistry {
    &REGISTRY
}
