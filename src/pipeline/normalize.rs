//! Normalization stage — unpack archives, flatten, merge.
//!
//! Works purely on the filesystem, so it can re-run over any directory that
//! still holds unprocessed archives. Archives that fail to open are kept in
//! place and reported; everything that extracts cleanly ends up flattened
//! in its own directory and merged into the shared output set,
//! first-writer-wins on filename collisions.

use crate::pipeline::{NormalizeReport, MERGED_DIR_NAME, PAYLOAD_EXTENSIONS};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// True for files the pipeline ultimately collects (font outlines).
pub fn is_payload(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            PAYLOAD_EXTENSIONS
                .iter()
                .any(|p| ext.eq_ignore_ascii_case(p))
        })
}

/// Normalize every archive in `out_dir` into `<out_dir>/all_payloads/`.
///
/// Archives are processed in lexicographic filename order so collisions
/// resolve deterministically.
pub fn normalize(out_dir: &Path, progress: Option<&ProgressBar>) -> Result<NormalizeReport> {
    let merged_dir = out_dir.join(MERGED_DIR_NAME);
    fs::create_dir_all(&merged_dir)
        .with_context(|| format!("failed to create {}", merged_dir.display()))?;

    let mut archives: Vec<PathBuf> = fs::read_dir(out_dir)
        .with_context(|| format!("failed to read {}", out_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    archives.sort();

    if let Some(bar) = progress {
        bar.set_length(archives.len() as u64);
    }

    let mut report = NormalizeReport::default();

    for archive in &archives {
        let stem = match archive.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        let extract_dir = out_dir.join(&stem);

        if let Err(e) = extract_archive(archive, &extract_dir) {
            // Unreadable archive: keep the zip so the failure is visible
            // and a later run can retry after a fresh download.
            tracing::warn!("failed to extract {}: {e:#}", archive.display());
            report.archives_failed += 1;
            if let Some(bar) = progress {
                bar.inc(1);
            }
            continue;
        }

        flatten(&extract_dir)?;
        let (merged, duplicates) = merge_into(&extract_dir, &merged_dir)?;
        report.files_merged += merged;
        report.duplicates_skipped += duplicates;

        fs::remove_file(archive)
            .with_context(|| format!("failed to remove {}", archive.display()))?;
        report.archives_processed += 1;

        tracing::info!(
            "normalized {stem}: {merged} file(s) merged, {duplicates} duplicate(s) skipped"
        );
        if let Some(bar) = progress {
            bar.inc(1);
        }
    }

    Ok(report)
}

/// Fully extract `archive` into `dest`, creating it if needed.
fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable zip archive", archive.display()))?;
    fs::create_dir_all(dest)
        .with_context(|| format!("failed to create {}", dest.display()))?;
    zip.extract(dest)
        .with_context(|| format!("failed to extract {}", archive.display()))?;
    Ok(())
}

/// Move every payload file anywhere under `dir` to its top level, then
/// delete every remaining non-payload file and every subdirectory.
///
/// A payload file whose name already exists at the top level is left where
/// it is and removed with the rest, never overwriting the first copy.
pub fn flatten(dir: &Path) -> Result<()> {
    let nested: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_payload(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    for src in nested {
        let Some(name) = src.file_name() else { continue };
        let dest = dir.join(name);
        if dest.exists() {
            continue;
        }
        fs::rename(&src, &dest)
            .with_context(|| format!("failed to move {} to {}", src.display(), dest.display()))?;
    }

    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        } else if !is_payload(&path) {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }

    Ok(())
}

/// Copy every top-level payload file from `src_dir` into `merged_dir`,
/// skipping names already present. Returns (merged, duplicates_skipped).
pub fn merge_into(src_dir: &Path, merged_dir: &Path) -> Result<(u32, u32)> {
    let mut files: Vec<PathBuf> = fs::read_dir(src_dir)
        .with_context(|| format!("failed to read {}", src_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_payload(p))
        .collect();
    files.sort();

    let mut merged = 0u32;
    let mut duplicates = 0u32;
    for src in files {
        let Some(name) = src.file_name() else { continue };
        let dest = merged_dir.join(name);
        if dest.exists() {
            duplicates += 1;
            continue;
        }
        fs::copy(&src, &dest)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
        merged += 1;
    }

    Ok((merged, duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn nested_payloads_flatten_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(
            &dir.path().join("A.zip"),
            &[
                ("x/y/Font.ttf", b"ttf-bytes"),
                ("x/readme.txt", b"read me"),
            ],
        );

        let report = normalize(dir.path(), None).unwrap();
        assert_eq!(report.archives_processed, 1);
        assert_eq!(report.files_merged, 1);

        let merged = dir.path().join(MERGED_DIR_NAME);
        assert!(merged.join("Font.ttf").is_file());
        assert!(!dir.path().join("A.zip").exists());

        // Extraction dir retains only flattened payload files.
        let extracted = dir.path().join("A");
        assert_eq!(names_in(&extracted), vec!["Font.ttf"]);
    }

    #[test]
    fn flatten_leaves_no_subdirs_or_non_payload_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("deep/er/still")).unwrap();
        fs::write(dir.path().join("deep/er/still/A.otf"), b"otf").unwrap();
        fs::write(dir.path().join("deep/license.txt"), b"MIT").unwrap();
        fs::write(dir.path().join("Top.ttf"), b"top").unwrap();
        fs::write(dir.path().join("notes.md"), b"notes").unwrap();

        flatten(dir.path()).unwrap();

        assert_eq!(names_in(dir.path()), vec!["A.otf", "Top.ttf"]);
    }

    #[test]
    fn flatten_collision_keeps_first_copy() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("Same.ttf"), b"top-level").unwrap();
        fs::write(dir.path().join("a/Same.ttf"), b"from-a").unwrap();
        fs::write(dir.path().join("b/Same.ttf"), b"from-b").unwrap();

        flatten(dir.path()).unwrap();

        assert_eq!(names_in(dir.path()), vec!["Same.ttf"]);
        assert_eq!(fs::read(dir.path().join("Same.ttf")).unwrap(), b"top-level");
    }

    #[test]
    fn merge_is_first_writer_wins_across_archives() {
        let dir = tempfile::tempdir().unwrap();
        // Lexicographic order: a.zip is processed before b.zip.
        write_zip(&dir.path().join("a.zip"), &[("Clash.ttf", b"from-a")]);
        write_zip(&dir.path().join("b.zip"), &[("Clash.ttf", b"from-b")]);

        let report = normalize(dir.path(), None).unwrap();
        assert_eq!(report.archives_processed, 2);
        assert_eq!(report.files_merged, 1);
        assert_eq!(report.duplicates_skipped, 1);

        let merged = dir.path().join(MERGED_DIR_NAME).join("Clash.ttf");
        assert_eq!(fs::read(merged).unwrap(), b"from-a");
    }

    #[test]
    fn unreadable_archive_is_kept_and_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.zip"), b"this is not a zip").unwrap();
        write_zip(&dir.path().join("good.zip"), &[("Ok.ttf", b"ok")]);

        let report = normalize(dir.path(), None).unwrap();
        assert_eq!(report.archives_failed, 1);
        assert_eq!(report.archives_processed, 1);
        // Failed archive stays on disk for inspection or retry.
        assert!(dir.path().join("bad.zip").is_file());
        assert!(!dir.path().join("good.zip").exists());
        assert!(dir.path().join(MERGED_DIR_NAME).join("Ok.ttf").is_file());
    }

    #[test]
    fn rerunning_over_new_archives_yields_the_union() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("first.zip"), &[("One.ttf", b"one")]);
        normalize(dir.path(), None).unwrap();

        write_zip(&dir.path().join("second.zip"), &[("Two.ttf", b"two")]);
        let report = normalize(dir.path(), None).unwrap();
        assert_eq!(report.archives_processed, 1);

        let merged = dir.path().join(MERGED_DIR_NAME);
        assert_eq!(names_in(&merged), vec!["One.ttf", "Two.ttf"]);
        assert_eq!(fs::read(merged.join("One.ttf")).unwrap(), b"one");
    }

    #[test]
    fn payload_detection_is_case_insensitive() {
        assert!(is_payload(Path::new("A.TTF")));
        assert!(is_payload(Path::new("b.Otf")));
        assert!(!is_payload(Path::new("readme.txt")));
        assert!(!is_payload(Path::new("noext")));
    }
}
