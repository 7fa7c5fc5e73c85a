// error.rs: error types shared by the math core, the renderers and the viewer

use thiserror::Error;

/// Errors raised by matrix construction.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MathError {
    #[error("matrix not invertible")]
    NotInvertible,
    #[error("degenerate frustum (fov {fov}, near {near}, far {far})")]
    DegenerateFrustum { fov: f64, near: f64, far: f64 },
}

/// Rejected scene-graph edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("unknown node {0}")]
    UnknownNode(usize),
    #[error("node {child} cannot become a child of its own descendant {parent}")]
    Cycle { parent: usize, child: usize },
    #[error("node {0} is not a child of the given parent")]
    NotAChild(usize),
    #[error("the scene root cannot be removed")]
    RemoveRoot,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create surface: {0}")]
    SurfaceCreation(String),
    #[error("failed to request device: {0}")]
    DeviceRequest(String),
    #[error("image width {width} exceeds the device limit {max}")]
    ImageTooBig { width: u32, max: u32 },
    #[error("cube face size {size} exceeds the device limit {max}")]
    CubeFaceTooBig { size: u32, max: u32 },
    #[error("cube faces must be six square images of equal size")]
    CubeFaceMismatch,
    #[error("invalid image type: {0}")]
    InvalidImageType(String),
    #[error("shader program failed to build: {0}")]
    Shader(String),
    #[error("face {face} references vertex {index}, but the geometry has {vertices}")]
    FaceIndex { face: usize, index: usize, vertices: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("hfov bounds do not make sense (min {min} > max {max})")]
    HfovBounds { min: f64, max: f64 },
    #[error("invalid scene id: {0}")]
    InvalidSceneId(String),
    #[error("no panorama image was specified")]
    NoPanorama,
    #[error("invalid image type: {0}")]
    InvalidImageType(String),
    #[error("a cube map needs six faces, got {0}")]
    CubeMapFaces(usize),
}

/// Anything that can end up in front of the user as a localized message.
pub trait UserFacing: std::error::Error {
    fn i18n_key(&self) -> &'static str;

    fn localized(&self) -> String {
        let key = self.i18n_key();
        let text = crate::i18n::tr(key);
        if text == key {
            self.to_string()
        } else {
            text
        }
    }
}

impl UserFacing for RenderError {
    fn i18n_key(&self) -> &'static str {
        match self {
            RenderError::NoAdapter
            | RenderError::SurfaceCreation(_)
            | RenderError::DeviceRequest(_) => "ERROR_NO_WEBGL",
            RenderError::ImageTooBig { .. } => "ERROR_IMG_TOO_BIG",
            RenderError::CubeFaceTooBig { .. } | RenderError::CubeFaceMismatch => {
                "ERROR_CUBE_FACE_TOO_BIG"
            }
            RenderError::InvalidImageType(_) => "ERROR_INVALID_IMG_TYPE",
            RenderError::Math(_) | RenderError::Shader(_) | RenderError::FaceIndex { .. } => {
                "ERROR_WEBGL"
            }
        }
    }

    fn localized(&self) -> String {
        match self {
            RenderError::ImageTooBig { max, .. } | RenderError::CubeFaceTooBig { max, .. } => {
                format!(
                    "{} {}{} {}",
                    crate::i18n::tr(self.i18n_key()),
                    crate::i18n::tr("TEXT_IMG_SUPPORTED_WIDTH"),
                    max,
                    crate::i18n::tr("TEXT_IMG_TOO_BIG_ADVICE"),
                )
            }
            _ => crate::i18n::tr(self.i18n_key()),
        }
    }
}

impl UserFacing for ConfigError {
    fn i18n_key(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "ERROR_FILE_ACCESS",
            ConfigError::Parse(_) => "ERROR_UNKNOWN",
            ConfigError::HfovBounds { .. } => "ERROR_HFOV_BOUNDS",
            ConfigError::InvalidSceneId(_) => "ERROR_INVALID_SCENE_ID",
            ConfigError::NoPanorama | ConfigError::CubeMapFaces(_) => "ERROR_NO_PANORAMA",
            ConfigError::InvalidImageType(_) => "ERROR_INVALID_IMG_TYPE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_errors_map_to_string_table_keys() {
        assert_eq!(RenderError::NoAdapter.i18n_key(), "ERROR_NO_WEBGL");
        assert_eq!(
            RenderError::ImageTooBig { width: 20000, max: 8192 }.i18n_key(),
            "ERROR_IMG_TOO_BIG"
        );
        assert_eq!(
            RenderError::Math(MathError::NotInvertible).to_string(),
            "matrix not invertible"
        );
    }

    #[test]
    fn localized_never_blank() {
        crate::i18n::init("en");
        let msg = ConfigError::NoPanorama.localized();
        assert!(!msg.is_empty());
        let msg = RenderError::ImageTooBig { width: 20000, max: 8192 }.localized();
        assert!(msg.contains("8192"));
    }
}
