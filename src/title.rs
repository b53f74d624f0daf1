// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::container::ContainerSource;
use crate::extract::TitleSelection;

/// The language folder used when none is given.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Disc index and data names, as they appear in the root of the disc image.
pub const KH2_DISC_INDEX: &str = "KH2.IDX;1";
pub const KH2_DISC_DATA: &str = "KH2.IMG;1";

const ORDINALS: [&str; 6] = ["first", "second", "third", "fourth", "fifth", "sixth"];

/// The games shipped in the collections, each of which is extracted into its own folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameTitle {
    /// Kingdom Hearts Final Mix.
    Kh1,
    /// Kingdom Hearts II Final Mix, the only title that also has a disc release to extract from.
    Kh2,
    /// Birth by Sleep Final Mix.
    Bbs,
    /// Re:Chain of Memories.
    Recom,
    /// Dream Drop Distance, which is installed separately from the other titles.
    Kh3d,
}

impl GameTitle {
    pub const ALL: [GameTitle; 5] = [
        GameTitle::Kh1,
        GameTitle::Kh2,
        GameTitle::Bbs,
        GameTitle::Recom,
        GameTitle::Kh3d,
    ];

    /// The folder this title is extracted into, under the destination.
    pub fn folder_name(&self) -> &'static str {
        match self {
            GameTitle::Kh1 => "kh1",
            GameTitle::Kh2 => "kh2",
            GameTitle::Bbs => "bbs",
            GameTitle::Recom => "Recom",
            GameTitle::Kh3d => "kh3d",
        }
    }

    /// File names (without extension) of every HED/PKG pair belonging to this title.
    pub fn package_names(&self) -> Vec<String> {
        let (prefix, count) = match self {
            GameTitle::Kh1 => ("kh1", 5),
            GameTitle::Kh2 => ("kh2", 6),
            GameTitle::Bbs => ("bbs", 4),
            GameTitle::Recom => return vec!["Recom".to_string()],
            GameTitle::Kh3d => ("kh3d", 4),
        };

        ORDINALS[..count]
            .iter()
            .map(|ordinal| format!("{prefix}_{ordinal}"))
            .collect()
    }

    /// The digital containers of this title, in an installation at `install` for `language`.
    pub fn digital_sources(&self, install: &Path, language: &str) -> Vec<ContainerSource> {
        let image = install.join("Image").join(language);

        self.package_names()
            .into_iter()
            .map(|name| ContainerSource::Digital {
                index: image.join(format!("{name}.hed")),
                data: image.join(format!("{name}.pkg")),
            })
            .collect()
    }

    /// The disc containers of this title inside of `image`, if it had a disc release we can read.
    pub fn disc_source(&self, image: &Path) -> Option<ContainerSource> {
        match self {
            GameTitle::Kh2 => Some(ContainerSource::DiscImage {
                image: image.to_path_buf(),
                index_name: KH2_DISC_INDEX.to_string(),
                data_name: KH2_DISC_DATA.to_string(),
            }),
            _ => None,
        }
    }

    /// Selects every digital container of this title for extraction.
    pub fn digital_selection(&self, install: &Path, language: &str) -> TitleSelection {
        TitleSelection::new(self.folder_name(), self.digital_sources(install, language))
    }

    /// Selects the disc containers of this title for extraction.
    pub fn disc_selection(&self, image: &Path) -> Option<TitleSelection> {
        self.disc_source(image)
            .map(|source| TitleSelection::new(self.folder_name(), vec![source]))
    }
}

impl fmt::Display for GameTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

impl FromStr for GameTitle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameTitle::ALL
            .into_iter()
            .find(|title| title.folder_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown title {s:?}, expected one of kh1, kh2, bbs, recom, kh3d"))
    }
}
