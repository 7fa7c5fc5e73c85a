// config.rs: JSON viewer / tour configuration
//
// Two shapes are accepted:
// - single scene: { "type": "equirectangular", "panorama": "pano.jpg", "hfov": 90, ... }
// - tour: { "default": { "firstScene": "a", ... }, "scenes": { "a": { ... }, "b": { ... } } }
//
// Values resolve as built-in defaults <- top-level / "default" <- scene.

use crate::error::ConfigError;
use crate::projection::ImageType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_HAOV: f64 = 360.0;
pub const DEFAULT_VAOV: f64 = 180.0;
pub const DEFAULT_HFOV: f64 = 100.0;
pub const DEFAULT_MIN_HFOV: f64 = 50.0;
pub const DEFAULT_MAX_HFOV: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotSpotKind {
    #[default]
    Info,
    Scene,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotSpot {
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default, rename = "type")]
    pub kind: HotSpotKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hfov: Option<f64>,
}

/// Options for one scene; every field is optional so layers can be merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneOptions {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panorama: Option<String>,
    /// Six faces: +z, +x, -z, -x, +y, -y.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cube_map: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haov: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaov: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_offset: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hfov: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_hfov: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hfov: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pitch: Option<f64>,

    /// RGB in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_spots: Option<Vec<HotSpot>>,

    /// Only meaningful at the top level or in `default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_scene: Option<String>,
}

impl SceneOptions {
    /// Options for images given on the command line.
    pub fn for_images(image_type: ImageType, paths: &[PathBuf]) -> Self {
        let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        match image_type {
            ImageType::Equirectangular => Self {
                image_type: Some("equirectangular".into()),
                panorama: names.into_iter().next(),
                ..Default::default()
            },
            ImageType::CubeMap => Self {
                image_type: Some("cubemap".into()),
                cube_map: Some(names),
                ..Default::default()
            },
        }
    }

    /// Field-wise overlay: values set in `over` win.
    pub fn merged_with(&self, over: &SceneOptions) -> SceneOptions {
        macro_rules! pick {
            ($($field:ident),*) => {
                SceneOptions { $($field: over.$field.clone().or_else(|| self.$field.clone()),)* }
            };
        }
        pick!(
            image_type, panorama, cube_map, base_path, haov, vaov, v_offset, hfov, min_hfov,
            max_hfov, yaw, min_yaw, max_yaw, pitch, min_pitch, max_pitch, background_color,
            title, author, hot_spots, first_scene
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanoramaSource {
    Equirectangular(PathBuf),
    CubeMap([PathBuf; 6]),
}

/// Fully resolved scene, angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub id: Option<String>,
    pub source: PanoramaSource,
    pub haov: f64,
    pub vaov: f64,
    pub v_offset: f64,
    pub hfov: f64,
    pub min_hfov: f64,
    pub max_hfov: f64,
    pub yaw: f64,
    pub min_yaw: f64,
    pub max_yaw: f64,
    pub pitch: f64,
    pub min_pitch: f64,
    pub max_pitch: f64,
    pub background: [f32; 4],
    pub title: Option<String>,
    pub author: Option<String>,
    pub hot_spots: Vec<HotSpot>,
}

impl SceneConfig {
    pub fn image_type(&self) -> ImageType {
        match self.source {
            PanoramaSource::Equirectangular(_) => ImageType::Equirectangular,
            PanoramaSource::CubeMap(_) => ImageType::CubeMap,
        }
    }

    /// Hot spots that link to other scenes.
    pub fn scene_links(&self) -> impl Iterator<Item = &HotSpot> {
        self.hot_spots.iter().filter(|h| h.kind == HotSpotKind::Scene)
    }
}

/// A configuration file: a single scene or a tour.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(flatten)]
    pub options: SceneOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SceneOptions>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scenes: BTreeMap<String, SceneOptions>,
    /// Directory relative paths resolve against when no `basePath` is set.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_json(&text)?;
        config.root = path.parent().map(Path::to_path_buf);
        log::info!("loaded configuration {} ({} scenes)", path.display(), config.scenes.len());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn single(options: SceneOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn is_tour(&self) -> bool {
        !self.scenes.is_empty()
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    fn base(&self) -> SceneOptions {
        match &self.default {
            Some(d) => self.options.merged_with(d),
            None => self.options.clone(),
        }
    }

    pub fn first_scene(&self) -> Option<&str> {
        self.default
            .as_ref()
            .and_then(|d| d.first_scene.as_deref())
            .or(self.options.first_scene.as_deref())
            .or_else(|| self.scenes.keys().next().map(String::as_str))
    }

    /// Checks everything that does not need the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_tour() {
            if let Some(first) = self.first_scene() {
                if !self.scenes.contains_key(first) {
                    return Err(ConfigError::InvalidSceneId(first.to_string()));
                }
            }
            for id in self.scenes.keys() {
                self.resolve(Some(id))?;
            }
        } else {
            self.resolve(None)?;
        }
        Ok(())
    }

    /// Resolves one scene (`None` for the first scene or the single scene).
    pub fn resolve(&self, scene_id: Option<&str>) -> Result<SceneConfig, ConfigError> {
        let base = self.base();
        let (id, merged) = if self.is_tour() {
            let id = match scene_id.or_else(|| self.first_scene()) {
                Some(id) => id,
                None => return Err(ConfigError::NoPanorama),
            };
            let scene = self
                .scenes
                .get(id)
                .ok_or_else(|| ConfigError::InvalidSceneId(id.to_string()))?;
            (Some(id.to_string()), base.merged_with(scene))
        } else {
            if let Some(id) = scene_id {
                return Err(ConfigError::InvalidSceneId(id.to_string()));
            }
            (None, base)
        };

        let image_type: ImageType = merged
            .image_type
            .as_deref()
            .unwrap_or("equirectangular")
            .parse()
            .map_err(|_| {
                ConfigError::InvalidImageType(merged.image_type.clone().unwrap_or_default())
            })?;

        let root = merged
            .base_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| self.root.clone());
        let locate = |p: &str| match &root {
            Some(r) => r.join(p),
            None => PathBuf::from(p),
        };

        let source = match image_type {
            ImageType::Equirectangular => match merged.panorama.as_deref() {
                Some(p) if !p.is_empty() => PanoramaSource::Equirectangular(locate(p)),
                _ => return Err(ConfigError::NoPanorama),
            },
            ImageType::CubeMap => match merged.cube_map.as_deref() {
                Some(faces) if faces.len() == 6 => {
                    PanoramaSource::CubeMap(std::array::from_fn(|i| locate(&faces[i])))
                }
                Some(faces) => return Err(ConfigError::CubeMapFaces(faces.len())),
                None => return Err(ConfigError::NoPanorama),
            },
        };

        let min_hfov = merged.min_hfov.unwrap_or(DEFAULT_MIN_HFOV);
        let max_hfov = merged.max_hfov.unwrap_or(DEFAULT_MAX_HFOV);
        if min_hfov > max_hfov {
            return Err(ConfigError::HfovBounds {
                min: min_hfov,
                max: max_hfov,
            });
        }

        let hot_spots = merged.hot_spots.unwrap_or_default();
        for spot in hot_spots.iter().filter(|h| h.kind == HotSpotKind::Scene) {
            match spot.scene_id.as_deref() {
                Some(target) if self.scenes.contains_key(target) => {}
                other => {
                    return Err(ConfigError::InvalidSceneId(other.unwrap_or_default().to_string()));
                }
            }
        }

        let [r, g, b] = merged.background_color.unwrap_or([0.0, 0.0, 0.0]);
        Ok(SceneConfig {
            id,
            source,
            haov: merged.haov.unwrap_or(DEFAULT_HAOV),
            vaov: merged.vaov.unwrap_or(DEFAULT_VAOV),
            v_offset: merged.v_offset.unwrap_or(0.0),
            hfov: merged.hfov.unwrap_or(DEFAULT_HFOV).clamp(min_hfov, max_hfov),
            min_hfov,
            max_hfov,
            yaw: merged.yaw.unwrap_or(0.0),
            min_yaw: merged.min_yaw.unwrap_or(-180.0),
            max_yaw: merged.max_yaw.unwrap_or(180.0),
            pitch: merged.pitch.unwrap_or(0.0),
            min_pitch: merged.min_pitch.unwrap_or(-90.0),
            max_pitch: merged.max_pitch.unwrap_or(90.0),
            background: [r, g, b, 1.0],
            title: merged.title,
            author: merged.author,
            hot_spots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scene_defaults() {
        let c = ViewerConfig::from_json(r#"{ "panorama": "pano.jpg" }"#).unwrap();
        let s = c.resolve(None).unwrap();
        assert_eq!(s.source, PanoramaSource::Equirectangular("pano.jpg".into()));
        assert_eq!((s.haov, s.vaov, s.v_offset), (360.0, 180.0, 0.0));
        assert_eq!((s.hfov, s.min_hfov, s.max_hfov), (100.0, 50.0, 120.0));
        assert_eq!((s.min_pitch, s.max_pitch), (-90.0, 90.0));
        assert_eq!(s.background, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn camel_case_keys() {
        let c = ViewerConfig::from_json(
            r#"{ "panorama": "p.jpg", "vOffset": -10, "minHfov": 30, "backgroundColor": [1, 0.5, 0] }"#,
        )
        .unwrap();
        let s = c.resolve(None).unwrap();
        assert_eq!(s.v_offset, -10.0);
        assert_eq!(s.min_hfov, 30.0);
        assert_eq!(s.background, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn hfov_bounds_checked() {
        let err = ViewerConfig::from_json(r#"{ "panorama": "p.jpg", "minHfov": 130 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::HfovBounds { min, max } if min == 130.0 && max == 120.0));
    }

    #[test]
    fn missing_panorama() {
        assert!(matches!(ViewerConfig::from_json("{}"), Err(ConfigError::NoPanorama)));
        assert!(matches!(
            ViewerConfig::from_json(r#"{ "type": "cubemap", "cubeMap": ["a", "b"] }"#),
            Err(ConfigError::CubeMapFaces(2))
        ));
        assert!(matches!(
            ViewerConfig::from_json(r#"{ "type": "multires", "panorama": "p.jpg" }"#),
            Err(ConfigError::InvalidImageType(t)) if t == "multires"
        ));
    }

    const TOUR: &str = r#"{
        "default": { "firstScene": "hall", "hfov": 90, "basePath": "/tour" },
        "scenes": {
            "hall": {
                "panorama": "hall.jpg",
                "hotSpots": [ { "type": "scene", "sceneId": "garden", "yaw": 10, "pitch": -2 } ]
            },
            "garden": { "panorama": "garden.jpg", "hfov": 110, "title": "Garden" }
        }
    }"#;

    #[test]
    fn tour_layers_merge() {
        let c = ViewerConfig::from_json(TOUR).unwrap();
        assert!(c.is_tour());
        assert_eq!(c.first_scene(), Some("hall"));

        let hall = c.resolve(None).unwrap();
        assert_eq!(hall.id.as_deref(), Some("hall"));
        assert_eq!(hall.hfov, 90.0);
        assert_eq!(hall.source, PanoramaSource::Equirectangular("/tour/hall.jpg".into()));
        assert_eq!(hall.scene_links().count(), 1);

        let garden = c.resolve(Some("garden")).unwrap();
        assert_eq!(garden.hfov, 110.0);
        assert_eq!(garden.title.as_deref(), Some("Garden"));
    }

    #[test]
    fn unknown_scene_ids_rejected() {
        let bad_first = TOUR.replace(r#""firstScene": "hall""#, r#""firstScene": "attic""#);
        assert!(matches!(
            ViewerConfig::from_json(&bad_first),
            Err(ConfigError::InvalidSceneId(id)) if id == "attic"
        ));

        let bad_link = TOUR.replace(r#""sceneId": "garden""#, r#""sceneId": "roof""#);
        assert!(matches!(
            ViewerConfig::from_json(&bad_link),
            Err(ConfigError::InvalidSceneId(id)) if id == "roof"
        ));

        let c = ViewerConfig::from_json(TOUR).unwrap();
        assert!(c.resolve(Some("cellar")).is_err());
    }

    #[test]
    fn cli_images() {
        let faces: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("f{i}.png"))).collect();
        let c = ViewerConfig::single(SceneOptions::for_images(ImageType::CubeMap, &faces));
        let s = c.resolve(None).unwrap();
        assert_eq!(s.image_type(), ImageType::CubeMap);
        match s.source {
            PanoramaSource::CubeMap(paths) => assert_eq!(paths[5], PathBuf::from("f5.png")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn load_reports_io_error() {
        let err = ViewerConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
