//! Course icon names mapped to a fixed set of rendering tags.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CourseIcon {
    #[default]
    Book,
    Code,
    Palette,
    Music,
    Language,
    Chart,
    Camera,
    Rocket,
}

const ICONS: [(&str, CourseIcon); 8] = [
    ("book", CourseIcon::Book),
    ("code", CourseIcon::Code),
    ("palette", CourseIcon::Palette),
    ("music", CourseIcon::Music),
    ("language", CourseIcon::Language),
    ("chart", CourseIcon::Chart),
    ("camera", CourseIcon::Camera),
    ("rocket", CourseIcon::Rocket),
];

impl CourseIcon {
    /// Unknown or empty names fall back to [`CourseIcon::Book`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        ICONS
            .iter()
            .find(|(key, _)| *key == name)
            .map_or(Self::Book, |(_, icon)| *icon)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        ICONS
            .iter()
            .find(|(_, icon)| *icon == self)
            .map_or("book", |(key, _)| *key)
    }
}
