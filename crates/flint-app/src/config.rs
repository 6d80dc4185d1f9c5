// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use flint_render::ShaderSet;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG: &str = "flint.toml";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "flint".to_owned(),
            width: 600,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RenderCfg {
    pub validation: bool,
    /// SPIR-V files replacing the built-in shaders. Both or neither.
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            validation: cfg!(debug_assertions),
            vertex_shader: None,
            fragment_shader: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

/// A missing file means defaults; anything unreadable or malformed is an error.
pub fn load(path: &Path) -> Result<AppCfg> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            return Ok(AppCfg::default());
        }
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    toml::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

impl RenderCfg {
    /// Shader blobs from the configured paths, or `builtin` when none are set.
    pub fn shaders(&self, builtin: impl FnOnce() -> ShaderSet) -> Result<ShaderSet> {
        match (&self.vertex_shader, &self.fragment_shader) {
            (None, None) => Ok(builtin()),
            (Some(vs), Some(fs)) => Ok(ShaderSet {
                vertex: read_blob(vs)?,
                fragment: read_blob(fs)?,
            }),
            _ => anyhow::bail!("vertex_shader and fragment_shader must be set together"),
        }
    }
}

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read shader {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_cfg(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    fn builtin() -> ShaderSet {
        ShaderSet {
            vertex: vec![1],
            fragment: vec![2],
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.title, "flint");
        assert_eq!((cfg.window.width, cfg.window.height), (600, 600));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_cfg("[window]\nwidth = 1024\n\n[render]\nvalidation = false\n");
        let cfg = load(file.path()).unwrap();
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.window.title, "flint");
        assert!(!cfg.render.validation);
        assert_eq!(cfg.render.vertex_shader, None);
    }

    #[test]
    fn malformed_file_is_reported() {
        let file = write_cfg("[window\nwidth = ");
        let err = load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn shaders_default_to_builtin() {
        let shaders = RenderCfg::default().shaders(builtin).unwrap();
        assert_eq!((shaders.vertex, shaders.fragment), (vec![1], vec![2]));
    }

    #[test]
    fn configured_shaders_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let vs = dir.path().join("a.vert.spv");
        let fs_path = dir.path().join("a.frag.spv");
        fs::write(&vs, [3, 4, 5, 6]).unwrap();
        fs::write(&fs_path, [7, 8, 9, 10]).unwrap();

        let cfg = RenderCfg {
            vertex_shader: Some(vs),
            fragment_shader: Some(fs_path),
            ..RenderCfg::default()
        };
        let shaders = cfg.shaders(builtin).unwrap();
        assert_eq!(shaders.vertex, vec![3, 4, 5, 6]);
        assert_eq!(shaders.fragment, vec![7, 8, 9, 10]);
    }

    #[test]
    fn a_lone_shader_path_is_rejected() {
        let cfg = RenderCfg {
            vertex_shader: Some(PathBuf::from("only.vert.spv")),
            ..RenderCfg::default()
        };
        assert!(cfg.shaders(builtin).is_err());
    }
}
