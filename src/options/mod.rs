//! Trail pipeline configuration with TOML preset support.
//!
//! Everything a host can tune (trail/node counts, widths, LOD tiers,
//! materials, camera targeting, stereo and per-stage debug toggles) is
//! consolidated here. Options serialize to/from TOML and export a JSON
//! schema for tooling.

mod debug;
mod lod;
mod material;

use std::path::Path;

pub use debug::DebugOptions;
pub use lod::LodSetting;
pub use material::{MaterialUniform, TrailBlend, TrailMaterial};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TrailError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[debug]`) work correctly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct TrailOptions {
    /// Number of trails (one per particle). Fixed until reallocation.
    #[schemars(title = "Trail Count", range(min = 1))]
    pub trail_num: u32,
    /// Ring capacity of every trail.
    #[schemars(title = "Nodes Per Trail", range(min = 2))]
    pub node_num_per_trail: u32,
    /// Ribbon width at the newest node.
    #[schemars(title = "Start Width", range(min = 0.0), extend("step" = 0.01))]
    pub start_width: f32,
    /// Ribbon width at the oldest node.
    #[schemars(title = "End Width", range(min = 0.0), extend("step" = 0.01))]
    pub end_width: f32,
    /// LOD tiers, ascending by start distance. Empty means one default
    /// tier.
    pub lods: Vec<LodSetting>,
    /// Material used by tiers that don't specify their own.
    #[schemars(skip)]
    pub default_material: TrailMaterial,
    /// Only render for this camera id; `None` renders for every camera.
    #[schemars(skip)]
    pub target_camera: Option<u32>,
    /// Layer bit tested against each view's culling mask.
    #[schemars(title = "Layer", range(min = 0, max = 31))]
    pub layer: u32,
    /// Single-pass instanced stereo: every trail is drawn once per eye.
    #[schemars(title = "Stereo")]
    pub stereo: bool,
    /// Per-stage toggles.
    pub debug: DebugOptions,
}

impl Default for TrailOptions {
    fn default() -> Self {
        Self {
            trail_num: 1000,
            node_num_per_trail: 64,
            start_width: 0.1,
            end_width: 0.1,
            lods: vec![LodSetting::default()],
            default_material: TrailMaterial::default(),
            target_camera: None,
            layer: 0,
            stereo: false,
            debug: DebugOptions::default(),
        }
    }
}

impl TrailOptions {
    /// Generate JSON Schema describing the UI-exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(TrailOptions)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Io`] or [`TrailError::OptionsParse`].
    pub fn load(path: &Path) -> Result<Self, TrailError> {
        let content = std::fs::read_to_string(path).map_err(TrailError::Io)?;
        toml::from_str(&content)
            .map_err(|e| TrailError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Io`] or [`TrailError::OptionsParse`].
    pub fn save(&self, path: &Path) -> Result<(), TrailError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrailError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(TrailError::Io)?;
        }
        std::fs::write(path, content).map_err(TrailError::Io)
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) =
                        path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }

    /// Check counts and normalize the LOD list.
    ///
    /// An empty LOD list becomes a single default tier, tiers are sorted by
    /// `start_distance`, and every `lod_node_step` is clamped into
    /// `[1, node_num_per_trail - 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::InvalidConfig`] for zero trails, fewer than two
    /// nodes per trail, a vertex count that overflows `u32`, a non-finite
    /// width or a NaN start distance.
    pub fn validate(&mut self) -> Result<(), TrailError> {
        if self.trail_num == 0 {
            return Err(TrailError::InvalidConfig(
                "trail_num must be at least 1".to_owned(),
            ));
        }
        if self.node_num_per_trail < 2 {
            return Err(TrailError::InvalidConfig(format!(
                "node_num_per_trail must be at least 2, got {}",
                self.node_num_per_trail
            )));
        }
        if !self.start_width.is_finite() || !self.end_width.is_finite() {
            return Err(TrailError::InvalidConfig(
                "trail widths must be finite".to_owned(),
            ));
        }

        if self
            .trail_num
            .checked_mul(self.node_num_per_trail)
            .and_then(|nodes| nodes.checked_mul(2))
            .is_none()
        {
            return Err(TrailError::InvalidConfig(format!(
                "{} trails x {} nodes overflows the vertex count",
                self.trail_num, self.node_num_per_trail
            )));
        }

        if self.lods.is_empty() {
            self.lods.push(LodSetting::default());
        }
        if let Some(i) =
            self.lods.iter().position(|lod| lod.start_distance.is_nan())
        {
            return Err(TrailError::InvalidConfig(format!(
                "lod[{i}]: start_distance is NaN"
            )));
        }
        let ascending = self
            .lods
            .windows(2)
            .all(|w| w[0].start_distance <= w[1].start_distance);
        if !ascending {
            log::warn!("lod start distances are not ascending, sorting tiers");
            self.lods
                .sort_by(|a, b| a.start_distance.total_cmp(&b.start_distance));
        }

        let max_step = self.node_num_per_trail - 1;
        for (i, lod) in self.lods.iter_mut().enumerate() {
            let clamped = lod.lod_node_step.clamp(1, max_step);
            if clamped != lod.lod_node_step {
                log::warn!(
                    "lod[{i}]: lod_node_step {} out of range, clamped to \
                     {clamped}",
                    lod.lod_node_step
                );
                lod.lod_node_step = clamped;
            }
        }
        Ok(())
    }

    /// Widest ribbon width; used to inflate culling bounds.
    pub fn max_width(&self) -> f32 {
        self.start_width.max(self.end_width)
    }

    /// Material for LOD tier `index`.
    pub fn material_for(&self, index: usize) -> &TrailMaterial {
        self.lods
            .get(index)
            .and_then(|lod| lod.material.as_ref())
            .unwrap_or(&self.default_material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = TrailOptions::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: TrailOptions = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
trail_num = 10

[debug]
culling = false
";
        let opts: TrailOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.trail_num, 10);
        assert!(!opts.debug.culling);
        // Everything else should be default
        assert_eq!(opts.node_num_per_trail, 64);
        assert!(opts.debug.append_node);
        assert_eq!(opts.lods.len(), 1);
    }

    #[test]
    fn lod_list_with_materials_parses() {
        let toml_str = r#"
[[lods]]
start_distance = 0.0

[[lods]]
start_distance = 50.0
lod_node_step = 4

[lods.material]
color = [1.0, 0.0, 0.0, 1.0]
blend = "additive"
"#;
        let opts: TrailOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.lods.len(), 2);
        assert_eq!(opts.lods[1].lod_node_step, 4);
        assert_eq!(opts.material_for(0), &TrailMaterial::default());
        assert_eq!(opts.material_for(1).blend, TrailBlend::Additive);
    }

    #[test]
    fn validate_clamps_lod_step_and_fills_empty_list() {
        let mut opts = TrailOptions {
            node_num_per_trail: 8,
            lods: Vec::new(),
            ..TrailOptions::default()
        };
        opts.validate().unwrap();
        assert_eq!(opts.lods.len(), 1);

        opts.lods[0].lod_node_step = 8;
        opts.lods.push(LodSetting {
            lod_node_step: 0,
            ..LodSetting::default()
        });
        opts.validate().unwrap();
        assert_eq!(opts.lods[0].lod_node_step, 7);
        assert_eq!(opts.lods[1].lod_node_step, 1);
    }

    #[test]
    fn validate_rejects_degenerate_counts() {
        let mut opts = TrailOptions {
            trail_num: 0,
            ..TrailOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TrailError::InvalidConfig(_))
        ));

        let mut opts = TrailOptions {
            node_num_per_trail: 1,
            ..TrailOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn validate_sorts_tiers_by_start_distance() {
        let tier = |start_distance, lod_node_step| LodSetting {
            start_distance,
            lod_node_step,
            ..LodSetting::default()
        };
        let mut opts = TrailOptions {
            lods: vec![tier(0.0, 1), tier(100.0, 4), tier(50.0, 2)],
            ..TrailOptions::default()
        };
        opts.validate().unwrap();

        let starts: Vec<f32> =
            opts.lods.iter().map(|lod| lod.start_distance).collect();
        assert_eq!(starts, vec![0.0, 50.0, 100.0]);
        // Settings travel with their distance.
        assert_eq!(opts.lods[1].lod_node_step, 2);
        assert_eq!(opts.lods[2].lod_node_step, 4);
    }

    #[test]
    fn validate_rejects_nan_start_distance() {
        let mut opts = TrailOptions {
            lods: vec![
                LodSetting::default(),
                LodSetting {
                    start_distance: f32::NAN,
                    ..LodSetting::default()
                },
            ],
            ..TrailOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TrailError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_overflowing_vertex_count() {
        let mut opts = TrailOptions {
            trail_num: 1 << 20,
            node_num_per_trail: 1 << 12,
            ..TrailOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TrailError::InvalidConfig(_))
        ));

        let mut opts = TrailOptions {
            trail_num: 1 << 16,
            node_num_per_trail: 1 << 10,
            ..TrailOptions::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn save_load_and_list_presets() {
        let dir = std::env::temp_dir()
            .join(format!("gpu-trail-presets-{}", std::process::id()));
        let opts = TrailOptions {
            trail_num: 42,
            ..TrailOptions::default()
        };
        opts.save(&dir.join("sparks.toml")).unwrap();

        assert_eq!(TrailOptions::list_presets(&dir), vec!["sparks"]);
        let loaded = TrailOptions::load(&dir.join("sparks.toml")).unwrap();
        assert_eq!(loaded, opts);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(TrailOptions::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();

        assert!(props.contains_key("trail_num"));
        assert!(props.contains_key("lods"));
        assert!(props.contains_key("debug"));

        // Skipped fields should be absent
        assert!(!props.contains_key("default_material"));
        assert!(!props.contains_key("target_camera"));
    }
}
