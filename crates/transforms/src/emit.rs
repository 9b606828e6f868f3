//! Turns a rewritten program into a binary.
//!
//! The default emitter lays the program out as an SDK-style project (sources,
//! resource bundle and a generated `.csproj`) and runs an external build
//! command inside it.

use crate::resources::{ResourceBundle, RESX_PATH};
use crate::session::root_namespace;
use serde::{Deserialize, Serialize};
use shroud_core::Program;
use shroud_utils::errors::EmitError;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    X86,
    #[default]
    X64,
    AnyCpu,
}

impl Platform {
    fn msbuild_name(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::AnyCpu => "AnyCPU",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" => Ok(Self::X86),
            "x64" => Ok(Self::X64),
            "anycpu" | "any-cpu" => Ok(Self::AnyCpu),
            _ => Err(format!("unknown platform '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Optimization {
    Debug,
    #[default]
    Release,
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
        })
    }
}

impl FromStr for Optimization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            _ => Err(format!("unknown optimization level '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    #[default]
    Exe,
    Library,
}

/// Target build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub platform: Platform,
    pub optimization: Optimization,
    pub allow_unsafe: bool,
    pub kind: OutputKind,
    /// Directory the build writes the binary to.
    pub output: PathBuf,
    pub target_framework: String,
    /// Build tool and its leading arguments. The project configuration and
    /// output directory are appended.
    pub command: String,
    pub args: Vec<String>,
    /// Project directory. A temporary directory is used when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            platform: Platform::X64,
            optimization: Optimization::Release,
            allow_unsafe: true,
            kind: OutputKind::Exe,
            output: PathBuf::from("bin"),
            target_framework: "net8.0".to_string(),
            command: "dotnet".to_string(),
            args: vec!["build".to_string()],
            work_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitOutcome {
    pub success: bool,
    pub output: PathBuf,
    /// Project directory, when it outlives the build.
    pub project_dir: Option<PathBuf>,
}

pub trait Emitter {
    fn emit(&self, program: &Program, resources: &ResourceBundle, options: &BuildOptions) -> Result<EmitOutcome, EmitError>;
}

/// Builds through an SDK-style project file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectEmitter;

impl ProjectEmitter {
    pub fn new() -> Self {
        Self
    }
}

/// Relative path inside the project, refusing absolute paths and `..`.
fn project_path(path: &str) -> Result<PathBuf, EmitError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(EmitError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unit path '{path}' leaves the project directory"),
        )));
    }
    Ok(relative.to_path_buf())
}

/// Writes every unit's current text under `dir`, keeping relative paths.
pub fn write_sources(program: &Program, dir: &Path) -> Result<Vec<PathBuf>, EmitError> {
    let mut written = Vec::with_capacity(program.len());
    for unit in program.units() {
        let path = dir.join(project_path(unit.path())?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, unit.text())?;
        written.push(path);
    }
    debug!("Wrote {} source file(s) to {}", written.len(), dir.display());
    Ok(written)
}

/// The SDK project file for `program`.
pub fn render_project(program: &Program, resources: &ResourceBundle, options: &BuildOptions) -> String {
    let name = program.name();
    let root = root_namespace(name);
    let kind = match options.kind {
        OutputKind::Exe => "Exe",
        OutputKind::Library => "Library",
    };
    let has_assembly_info = program.units().iter().any(|u| u.file_name() == "AssemblyInfo.cs");

    let mut out = String::from("<Project Sdk=\"Microsoft.NET.Sdk\">\n  <PropertyGroup>\n");
    let mut property = |key: &str, value: &str| out.push_str(&format!("    <{key}>{value}</{key}>\n"));
    property("OutputType", kind);
    property("TargetFramework", &options.target_framework);
    property("AssemblyName", name);
    property("RootNamespace", &root);
    property("PlatformTarget", options.platform.msbuild_name());
    property(
        "Optimize",
        if options.optimization == Optimization::Release { "true" } else { "false" },
    );
    property("AllowUnsafeBlocks", if options.allow_unsafe { "true" } else { "false" });
    property("ImplicitUsings", "disable");
    property("Nullable", "disable");
    if has_assembly_info {
        property("GenerateAssemblyInfo", "false");
    }
    if !resources.is_empty() {
        property("GenerateResourceUsePreserializedResources", "true");
    }
    out.push_str("  </PropertyGroup>\n");

    if !resources.is_empty() {
        out.push_str(&format!(
            "  <ItemGroup>\n    <EmbeddedResource Update=\"{}\" LogicalName=\"{}\" />\n    <PackageReference Include=\"System.Resources.Extensions\" Version=\"8.0.0\" />\n  </ItemGroup>\n",
            RESX_PATH.replace('/', "\\"),
            ResourceBundle::logical_name(&root)
        ));
    }
    out.push_str("</Project>\n");
    out
}

impl ProjectEmitter {
    fn build_in(
        &self,
        dir: &Path,
        program: &Program,
        resources: &ResourceBundle,
        options: &BuildOptions,
    ) -> Result<PathBuf, EmitError> {
        write_sources(program, dir)?;
        resources.write_to(dir)?;
        let project = dir.join(format!("{}.csproj", program.name()));
        fs::write(&project, render_project(program, resources, options))?;

        let output = if options.output.is_absolute() {
            options.output.clone()
        } else {
            std::env::current_dir()?.join(&options.output)
        };
        info!("Building {} with '{}'", project.display(), options.command);
        let result = Command::new(&options.command)
            .args(&options.args)
            .arg("--configuration")
            .arg(options.optimization.to_string())
            .arg("--output")
            .arg(&output)
            .current_dir(dir)
            .output()
            .map_err(|source| EmitError::Spawn {
                command: options.command.clone(),
                source,
            })?;
        if !result.status.success() {
            let mut log = String::from_utf8_lossy(&result.stderr).into_owned();
            if log.trim().is_empty() {
                log = String::from_utf8_lossy(&result.stdout).into_owned();
            }
            return Err(EmitError::Failed {
                status: result.status.code(),
                stderr: log,
            });
        }
        Ok(output)
    }
}

impl Emitter for ProjectEmitter {
    fn emit(&self, program: &Program, resources: &ResourceBundle, options: &BuildOptions) -> Result<EmitOutcome, EmitError> {
        match &options.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let output = self.build_in(dir, program, resources, options)?;
                Ok(EmitOutcome {
                    success: true,
                    output,
                    project_dir: Some(dir.clone()),
                })
            }
            None => {
                let dir = tempfile::tempdir()?;
                let output = self.build_in(dir.path(), program, resources, options)?;
                Ok(EmitOutcome {
                    success: true,
                    output,
                    project_dir: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EmbeddedPayload;

    fn program() -> Program {
        Program::from_sources(
            "App",
            [
                ("Program.cs", "class P { static void Main() {} }"),
                ("Properties/AssemblyInfo.cs", "class Info {}"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn project_reflects_options() {
        let options = BuildOptions {
            platform: Platform::X86,
            optimization: Optimization::Debug,
            allow_unsafe: false,
            ..BuildOptions::default()
        };
        let project = render_project(&program(), &ResourceBundle::default(), &options);
        assert!(project.contains("<AssemblyName>App</AssemblyName>"));
        assert!(project.contains("<PlatformTarget>x86</PlatformTarget>"));
        assert!(project.contains("<Optimize>false</Optimize>"));
        assert!(project.contains("<AllowUnsafeBlocks>false</AllowUnsafeBlocks>"));
        assert!(project.contains("<GenerateAssemblyInfo>false</GenerateAssemblyInfo>"));
        assert!(!project.contains("EmbeddedResource"));
    }

    #[test]
    fn project_embeds_resources() {
        let payloads = [EmbeddedPayload {
            name: "Clip".to_string(),
            data: b"RIFF".to_vec(),
        }];
        let bundle = ResourceBundle::from_payloads(&payloads, "wav").unwrap();
        let project = render_project(&program(), &bundle, &BuildOptions::default());
        assert!(project.contains("LogicalName=\"App.Properties.Resources.resources\""));
        assert!(project.contains("Update=\"Properties\\Resources.resx\""));
    }

    #[test]
    fn sources_keep_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_sources(&program(), dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("Properties/AssemblyInfo.cs")).unwrap(),
            "class Info {}"
        );
    }

    #[test]
    fn escaping_paths_are_refused() {
        assert!(project_path("../outside.cs").is_err());
        assert!(project_path("/abs.cs").is_err());
        assert!(project_path("a/b.cs").is_ok());
    }

    #[test]
    fn missing_build_tool_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            command: "shroud-no-such-build-tool".to_string(),
            work_dir: Some(dir.path().join("project")),
            output: dir.path().join("out"),
            ..BuildOptions::default()
        };
        let err = ProjectEmitter.emit(&program(), &ResourceBundle::default(), &options).unwrap_err();
        assert!(matches!(err, EmitError::Spawn { .. }));
        assert!(dir.path().join("project/App.csproj").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_build_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()],
            output: dir.path().join("out"),
            ..BuildOptions::default()
        };
        match ProjectEmitter.emit(&program(), &ResourceBundle::default(), &options) {
            Err(EmitError::Failed { status, stderr }) => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_build_reports_output() {
        let dir = tempfile::tempdir().unwrap();
        let options = BuildOptions {
            command: "true".to_string(),
            args: Vec::new(),
            output: dir.path().join("out"),
            ..BuildOptions::default()
        };
        let outcome = ProjectEmitter.emit(&program(), &ResourceBundle::default(), &options).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, dir.path().join("out"));
        assert!(outcome.project_dir.is_none());
    }
}
