// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::ContainerKind;
use crate::error::Error;
use crate::extract::{ExtractionJob, RemasteredLayout, TitleSelection};
use crate::names::NameTable;
use crate::title::{GameTitle, DEFAULT_LANGUAGE};

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// A title to extract, either one of the known games or a list of containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TitleConfig {
    /// One of the known games, from a digital installation or a disc image.
    Preset {
        preset: GameTitle,
        /// The root of a digital installation, containing the `Image` folder.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        install: Option<PathBuf>,
        #[serde(default = "default_language")]
        language: String,
        /// A disc image to extract from instead.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disc_image: Option<PathBuf>,
    },
    /// Containers given explicitly.
    Custom(TitleSelection),
}

impl TitleConfig {
    pub fn selection(&self) -> Result<TitleSelection, Error> {
        match self {
            TitleConfig::Preset {
                preset,
                install,
                language,
                disc_image,
            } => match (install, disc_image) {
                (Some(install), None) => Ok(preset.digital_selection(install, language)),
                (None, Some(image)) => preset.disc_selection(image).ok_or_else(|| {
                    Error::config(format!("{preset} can't be extracted from a disc image"))
                }),
                _ => Err(Error::config(format!(
                    "{preset} needs exactly one of install or disc_image"
                ))),
            },
            TitleConfig::Custom(selection) => {
                if selection.sources.is_empty() {
                    return Err(Error::config(format!(
                        "title {} has no containers",
                        selection.name
                    )));
                }

                selection.validate_name()?;

                Ok(selection.clone())
            }
        }
    }
}

/// A name table file to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTableConfig {
    pub path: PathBuf,
    /// Which hash to use for a path list. If left out, paths are hashed for both releases.
    /// JSON tables carry their hashes already, so this is ignored for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContainerKind>,
}

impl NameTableConfig {
    pub fn load(&self) -> Result<NameTable, Error> {
        match self.kind {
            Some(kind) => NameTable::load(&self.path, kind),
            None => {
                let mut table = NameTable::load(&self.path, ContainerKind::Disc)?;
                table.extend(NameTable::load(&self.path, ContainerKind::Digital)?);
                Ok(table)
            }
        }
    }
}

/// Describes an extraction run. Relative paths are relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    pub destination: PathBuf,
    #[serde(default)]
    pub titles: Vec<TitleConfig>,
    #[serde(default)]
    pub name_tables: Vec<NameTableConfig>,
    #[serde(default)]
    pub layout: RemasteredLayout,
}

impl ExtractionConfig {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| Error::config(err.to_string()))
    }

    /// Reads the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::config(format!("unable to read {}: {err}", path.display())))?;

        Self::from_json(&text)
    }

    /// Builds the name table out of every configured file, later files win.
    pub fn load_names(&self) -> Result<NameTable, Error> {
        let mut table = NameTable::new();
        for source in &self.name_tables {
            table.extend(source.load()?);
        }

        debug!(names = table.len(), "Loaded name tables");

        Ok(table)
    }

    /// Turns the configuration into a job, loading all of the name tables.
    pub fn into_job(self) -> Result<ExtractionJob, Error> {
        if self.titles.is_empty() {
            return Err(Error::config("no titles selected"));
        }

        let titles = self
            .titles
            .iter()
            .map(TitleConfig::selection)
            .collect::<Result<Vec<_>, _>>()?;

        for (i, title) in titles.iter().enumerate() {
            if titles[..i].iter().any(|other| other.name == title.name) {
                return Err(Error::config(format!("title {} is selected twice", title.name)));
            }
        }

        let names = self.load_names()?;

        Ok(ExtractionJob::new(self.destination, titles, Arc::new(names)).with_layout(self.layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSource;

    #[test]
    fn presets() {
        let config = ExtractionConfig::from_json(
            r#"{
                "destination": "out",
                "titles": [
                    { "preset": "kh2", "disc_image": "kh2.iso" },
                    { "preset": "bbs", "install": "C:/Games/KH", "language": "dt" }
                ],
                "layout": "mirrored"
            }"#,
        )
        .unwrap();

        assert_eq!(config.layout, RemasteredLayout::Mirrored);

        let job = config.into_job().unwrap();
        assert_eq!(job.destination, PathBuf::from("out"));
        assert_eq!(job.layout, RemasteredLayout::Mirrored);
        assert_eq!(job.titles.len(), 2);
        assert_eq!(job.titles[0].name, "kh2");
        assert!(matches!(
            job.titles[0].sources[0],
            ContainerSource::DiscImage { .. }
        ));
        assert_eq!(job.titles[1].sources.len(), 4);
        assert!(job.names.is_empty());
    }

    #[test]
    fn custom_titles() {
        let config = ExtractionConfig::from_json(
            r#"{
                "destination": "out",
                "titles": [
                    {
                        "name": "kh2",
                        "sources": [
                            { "kind": "disc_files", "index": "KH2.IDX", "data": "KH2.IMG" }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.layout, RemasteredLayout::Sibling);

        let job = config.into_job().unwrap();
        assert_eq!(
            job.titles[0].sources,
            vec![ContainerSource::DiscFiles {
                index: "KH2.IDX".into(),
                data: "KH2.IMG".into()
            }]
        );
    }

    #[test]
    fn invalid_configs() {
        let invalid = [
            // no titles
            r#"{ "destination": "out" }"#,
            // both sources
            r#"{ "destination": "out", "titles": [{ "preset": "kh2", "install": "a", "disc_image": "b" }] }"#,
            // neither
            r#"{ "destination": "out", "titles": [{ "preset": "kh1" }] }"#,
            // no disc release
            r#"{ "destination": "out", "titles": [{ "preset": "kh1", "disc_image": "kh1.iso" }] }"#,
            // duplicate
            r#"{ "destination": "out", "titles": [{ "preset": "kh1", "install": "a" }, { "preset": "kh1", "install": "b" }] }"#,
            // names that leave the destination
            r#"{ "destination": "out", "titles": [{ "name": "../escaped", "sources": [{ "kind": "digital", "index": "a.hed", "data": "a.pkg" }] }] }"#,
            r#"{ "destination": "out", "titles": [{ "name": "/abs", "sources": [{ "kind": "digital", "index": "a.hed", "data": "a.pkg" }] }] }"#,
            r#"{ "destination": "out", "titles": [{ "name": "", "sources": [{ "kind": "digital", "index": "a.hed", "data": "a.pkg" }] }] }"#,
            r#"{ "destination": "out", "titles": [{ "name": "C:", "sources": [{ "kind": "digital", "index": "a.hed", "data": "a.pkg" }] }] }"#,
            // missing name table
            r#"{ "destination": "out", "titles": [{ "preset": "kh1", "install": "a" }], "name_tables": [{ "path": "does/not/exist.txt" }] }"#,
        ];

        for text in invalid {
            assert!(
                matches!(
                    ExtractionConfig::from_json(text).and_then(ExtractionConfig::into_job),
                    Err(Error::Config { .. })
                ),
                "{text}"
            );
        }

        assert!(ExtractionConfig::from_json(r#"{ "destination": "out", "unknown": 1 }"#).is_err());
        assert!(ExtractionConfig::from_json("not json").is_err());
    }

    #[test]
    fn name_tables() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("names.txt");
        std::fs::write(&list, "00system.bin\n").unwrap();

        let config = ExtractionConfig {
            destination: "out".into(),
            titles: Vec::new(),
            name_tables: vec![NameTableConfig {
                path: list.clone(),
                kind: None,
            }],
            layout: RemasteredLayout::default(),
        };

        // hashed for both releases
        let names = config.load_names().unwrap();
        assert_eq!(names.len(), 2);

        let only_disc = NameTableConfig {
            path: list,
            kind: Some(ContainerKind::Disc),
        };
        assert_eq!(only_disc.load().unwrap().len(), 1);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("khpack.json");
        std::fs::write(
            &path,
            r#"{ "destination": "out", "titles": [{ "preset": "recom", "install": "." }] }"#,
        )
        .unwrap();

        let config = ExtractionConfig::load(&path).unwrap();
        assert_eq!(
            config.titles,
            vec![TitleConfig::Preset {
                preset: GameTitle::Recom,
                install: Some(".".into()),
                language: "en".to_string(),
                disc_image: None,
            }]
        );

        assert!(ExtractionConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
