//! GPU program sources and validation
//!
//! Both programs are plain WGSL text. They are loaded from the configured
//! [`ShaderSource`], then parsed and validated with naga before wgpu sees
//! them, so diagnostics can be reported with the program name instead of
//! surfacing as an uncaptured device error.

use crate::error::{TracerError, TracerResult};

pub const RAYTRACER_WGSL: &str = include_str!("../../shaders/raytracer.wgsl");
pub const PRESENT_WGSL: &str = include_str!("../../shaders/present.wgsl");

/// A GPU program and the entry points the pipelines expect it to expose
#[derive(Debug, Clone, Copy)]
pub struct ShaderProgram {
    pub name: &'static str,
    pub file: &'static str,
    pub entry_points: &'static [(naga::ShaderStage, &'static str)],
    embedded: &'static str,
}

/// Path-trace compute program
pub const RAYTRACER: ShaderProgram = ShaderProgram {
    name: "raytracer",
    file: "raytracer.wgsl",
    entry_points: &[(naga::ShaderStage::Compute, "main")],
    embedded: RAYTRACER_WGSL,
};

/// Tone-map/present program
pub const PRESENT: ShaderProgram = ShaderProgram {
    name: "present",
    file: "present.wgsl",
    entry_points: &[
        (naga::ShaderStage::Vertex, "vs_main"),
        (naga::ShaderStage::Fragment, "fs_main"),
    ],
    embedded: PRESENT_WGSL,
};

/// Where program text comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShaderSource {
    /// Copies compiled into the binary
    #[default]
    Embedded,
    /// `<dir>/<file>` on the local filesystem, for editing shaders without rebuilding
    Directory(std::path::PathBuf),
    /// `<base>/<file>?v=<timestamp>`, fetched over HTTP (web only)
    Url(String),
}

/// Append a cache-busting query so browsers never serve a stale program.
pub fn cache_busted_url(base: &str, file: &str, stamp: u64) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("{}?v={}", file, stamp)
    } else {
        format!("{}/{}?v={}", base, file, stamp)
    }
}

impl ShaderSource {
    /// Fetch the program text. Awaited once during initialization.
    pub async fn load(&self, program: &ShaderProgram) -> TracerResult<String> {
        let load_error = |message: String| TracerError::ShaderLoad {
            name: program.file.to_string(),
            message,
        };

        match self {
            ShaderSource::Embedded => Ok(program.embedded.to_string()),
            #[cfg(not(target_arch = "wasm32"))]
            ShaderSource::Directory(dir) => {
                let path = dir.join(program.file);
                log::info!("Loading {} from {}", program.name, path.display());
                std::fs::read_to_string(&path).map_err(|e| load_error(e.to_string()))
            }
            #[cfg(target_arch = "wasm32")]
            ShaderSource::Directory(_) => Err(load_error(
                "filesystem shader sources are not available on the web".into(),
            )),
            #[cfg(target_arch = "wasm32")]
            ShaderSource::Url(base) => {
                let stamp = js_sys::Date::now() as u64;
                let url = cache_busted_url(base, program.file, stamp);
                log::info!("Fetching {}", url);
                crate::web::fetch_text(&url).await.map_err(load_error)
            }
            #[cfg(not(target_arch = "wasm32"))]
            ShaderSource::Url(base) => Err(load_error(format!(
                "HTTP shader sources ({}) are only fetched on the web",
                base
            ))),
        }
    }
}

/// Parse and validate WGSL, checking the program's entry points exist.
pub fn validate_wgsl(program: &ShaderProgram, source: &str) -> TracerResult<naga::Module> {
    let compile_error = |message: String| TracerError::ShaderCompilation {
        program: program.name.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| compile_error(format!("WGSL parse error: {e}")))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| compile_error(format!("Validation error: {e}")))?;

    for (stage, name) in program.entry_points {
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == *name && ep.stage == *stage)
        {
            return Err(compile_error(format!(
                "Entry point '{}' not found for stage {:?}",
                name, stage
            )));
        }
    }

    Ok(module)
}

/// Load and validate a program, logging any diagnostics once.
pub async fn load_program(source: &ShaderSource, program: &ShaderProgram) -> TracerResult<String> {
    let text = source.load(program).await?;
    if let Err(e) = validate_wgsl(program, &text) {
        log::error!("{}", e);
        return Err(e);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_programs_validate() {
        validate_wgsl(&RAYTRACER, RAYTRACER_WGSL).unwrap();
        validate_wgsl(&PRESENT, PRESENT_WGSL).unwrap();
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = validate_wgsl(&RAYTRACER, "fn main( {").unwrap_err();
        match err {
            TracerError::ShaderCompilation { program, message } => {
                assert_eq!(program, "raytracer");
                assert!(message.starts_with("WGSL parse error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_point_is_reported() {
        let source = "@compute @workgroup_size(8, 8) fn other() {}";
        let err = validate_wgsl(&RAYTRACER, source).unwrap_err();
        assert!(err.to_string().contains("Entry point 'main' not found"));
    }

    #[test]
    fn test_cache_busted_url() {
        assert_eq!(
            cache_busted_url("https://host/shaders/", "raytracer.wgsl", 42),
            "https://host/shaders/raytracer.wgsl?v=42"
        );
        assert_eq!(cache_busted_url("", "present.wgsl", 7), "present.wgsl?v=7");
    }

    #[test]
    fn test_directory_source_reads_files() {
        let dir = std::env::temp_dir()
            .join(format!("stellar-tracer-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("present.wgsl"), PRESENT_WGSL).unwrap();

        let source = ShaderSource::Directory(dir.clone());
        let text = pollster::block_on(load_program(&source, &PRESENT)).unwrap();
        assert_eq!(text, PRESENT_WGSL);

        let missing = pollster::block_on(source.load(&RAYTRACER));
        assert!(matches!(missing, Err(TracerError::ShaderLoad { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
