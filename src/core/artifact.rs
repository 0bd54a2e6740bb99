//! Producing the deployable output: publish, archive, checksum.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::params::Configuration;
use crate::utils::command;
use crate::utils::template::{self, TemplateVars};
use crate::version::VersionInfo;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub project: String,
    pub configuration: Configuration,
    pub output: PathBuf,
    pub version: VersionInfo,
}

pub trait Publisher: Send + Sync {
    fn publish(&self, request: &PublishRequest) -> Result<()>;
}

/// Runs a user-supplied shell command template.
pub struct CommandPublisher {
    template: String,
    working_dir: String,
}

impl CommandPublisher {
    pub fn new(template: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn render(&self, request: &PublishRequest) -> String {
        let output = request.output.to_string_lossy();
        template::render(
            &self.template,
            &[
                (TemplateVars::PROJECT, request.project.as_str()),
                (TemplateVars::CONFIGURATION, request.configuration.as_str()),
                (TemplateVars::OUTPUT, output.as_ref()),
                (TemplateVars::VERSION, request.version.semver.as_str()),
                (
                    TemplateVars::INFORMATIONAL_VERSION,
                    request.version.informational.as_str(),
                ),
                (TemplateVars::ASSEMBLY_VERSION, request.version.assembly.as_str()),
            ],
        )
    }
}

impl Publisher for CommandPublisher {
    fn publish(&self, request: &PublishRequest) -> Result<()> {
        if !template::is_present(&self.template, TemplateVars::OUTPUT) {
            log_status!(
                "publish",
                "Warning: publish command has no {{{{output}}}} placeholder"
            );
        }
        let rendered = self.render(request);
        log_status!("publish", "{}", rendered);
        command::run_shell(&self.working_dir, &rendered)?;
        Ok(())
    }
}

/// Remove `dir` and everything under it; a missing directory is fine.
pub fn clean_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(e, "remove", dir)),
    }
}

/// Zip every file under `dir` into `archive`, with paths relative to `dir`.
///
/// Returns the number of files written.
pub fn create_zip_from_directory(dir: &Path, archive: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Err(Error::validation_invalid_argument(
            "artifact",
            format!("Nothing to archive: {} is not a directory", dir.display()),
            Some(dir.display().to_string()),
        ));
    }
    if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(e, "create", parent))?;
    }

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let file = File::create(archive).map_err(|e| io_error(e, "create", archive))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for path in &files {
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options).map_err(zip_error)?;
        let mut source = File::open(path).map_err(|e| io_error(e, "read", path))?;
        io::copy(&mut source, &mut zip).map_err(|e| io_error(e, "write", archive))?;
    }

    zip.finish().map_err(zip_error)?;
    Ok(files.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| io_error(e, "read", dir))?;
    for entry in entries {
        let path = entry.map_err(|e| io_error(e, "read", dir))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Write `<archive>.sha256` in `sha256sum` format and return its path.
pub fn write_checksum(archive: &Path) -> Result<PathBuf> {
    let mut file = File::open(archive).map_err(|e| io_error(e, "read", archive))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_error(e, "read", archive))?;
    let digest = format!("{:x}", hasher.finalize());

    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut target = archive.as_os_str().to_owned();
    target.push(".sha256");
    let target = PathBuf::from(target);

    let mut out = File::create(&target).map_err(|e| io_error(e, "create", &target))?;
    writeln!(out, "{}  {}", digest, file_name).map_err(|e| io_error(e, "write", &target))?;
    Ok(target)
}

fn io_error(err: io::Error, action: &str, path: &Path) -> Error {
    Error::internal_io(
        err.to_string(),
        Some(format!("{} {}", action, path.display())),
    )
}

fn zip_error(err: zip::result::ZipError) -> Error {
    Error::internal_io(err.to_string(), Some("write zip archive".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn request(output: &Path) -> PublishRequest {
        PublishRequest {
            project: "src/web".to_string(),
            configuration: Configuration::Release,
            output: output.to_path_buf(),
            version: VersionInfo::from_tag("v1.2.3", Some("abc1234")).unwrap(),
        }
    }

    #[test]
    fn renders_every_placeholder() {
        let publisher = CommandPublisher::new(
            "build {{project}} -c {{configuration}} -o {{output}} /v:{{version}} /i:{{informationalVersion}} /a:{{assemblyVersion}}",
            ".",
        );
        let rendered = publisher.render(&request(Path::new("artifacts/publish")));
        assert_eq!(
            rendered,
            "build src/web -c Release -o artifacts/publish /v:1.2.3 /i:1.2.3+abc1234 /a:1.2.3.0"
        );
    }

    #[test]
    fn publish_runs_the_rendered_command() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("publish");
        let publisher = CommandPublisher::new(
            "mkdir -p {{output}} && echo {{version}} > {{output}}/VERSION",
            dir.path().to_string_lossy(),
        );
        publisher.publish(&request(&out)).unwrap();
        assert_eq!(fs::read_to_string(out.join("VERSION")).unwrap().trim(), "1.2.3");
    }

    #[test]
    fn failing_publish_is_an_external_error() {
        let dir = TempDir::new().unwrap();
        let publisher = CommandPublisher::new("exit 7", dir.path().to_string_lossy());
        let err = publisher.publish(&request(dir.path())).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ExternalCommandFailed);
        assert_eq!(err.details["exitCode"], 7);
    }

    #[test]
    fn zips_nested_files_with_relative_names() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("publish");
        fs::create_dir_all(src.join("wwwroot")).unwrap();
        fs::write(src.join("app.dll"), b"binary").unwrap();
        fs::write(src.join("wwwroot/index.html"), b"<html/>").unwrap();

        let archive = dir.path().join("out/app.zip");
        assert_eq!(create_zip_from_directory(&src, &archive).unwrap(), 2);

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut html = String::new();
        zip.by_name("wwwroot/index.html")
            .unwrap()
            .read_to_string(&mut html)
            .unwrap();
        assert_eq!(html, "<html/>");
        assert!(zip.by_name("app.dll").is_ok());
    }

    #[test]
    fn zipping_a_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = create_zip_from_directory(&dir.path().join("nope"), &dir.path().join("a.zip"))
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn checksum_file_matches_sha256sum_format() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("app.zip");
        fs::write(&archive, b"abc").unwrap();

        let sum = write_checksum(&archive).unwrap();
        assert_eq!(sum, dir.path().join("app.zip.sha256"));
        assert_eq!(
            fs::read_to_string(sum).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  app.zip\n"
        );
    }

    #[test]
    fn clean_dir_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("artifacts");
        clean_dir(&target).unwrap();
        fs::create_dir_all(target.join("publish")).unwrap();
        clean_dir(&target).unwrap();
        assert!(!target.exists());
    }
}
