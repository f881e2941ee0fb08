//! Asset categories and their per-category store keys, directories and
//! candidate file extensions.

use std::path::PathBuf;

use crate::config::PathConfig;

/// An asset class with its own cancellation/progress keys and directory.
///
/// `Model` is the ML model weights; the rest are theme resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Model,
    Wheel,
    Icon,
    Sound,
    Color,
    Signal,
    DistanceIcon,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Model,
        Category::Wheel,
        Category::Icon,
        Category::Sound,
        Category::Color,
        Category::Signal,
        Category::DistanceIcon,
    ];

    /// Theme categories (everything but `Model`).
    pub const THEMES: [Category; 6] = [
        Category::Wheel,
        Category::Icon,
        Category::Sound,
        Category::Color,
        Category::Signal,
        Category::DistanceIcon,
    ];

    /// Stable slot index for per-category state arrays.
    pub fn index(self) -> usize {
        match self {
            Category::Model => 0,
            Category::Wheel => 1,
            Category::Icon => 2,
            Category::Sound => 3,
            Category::Color => 4,
            Category::Signal => 5,
            Category::DistanceIcon => 6,
        }
    }

    /// Human-readable name used in progress messages.
    pub fn display(self) -> &'static str {
        match self {
            Category::Model => "Model",
            Category::Wheel => "Wheel",
            Category::Icon => "Icon",
            Category::Sound => "Sound",
            Category::Color => "Color",
            Category::Signal => "Signal",
            Category::DistanceIcon => "Distance icon",
        }
    }

    /// Store key external writers set to request a download.
    pub fn download_key(self) -> &'static str {
        match self {
            Category::Model => "ModelToDownload",
            Category::Wheel => "WheelToDownload",
            Category::Icon => "IconToDownload",
            Category::Sound => "SoundToDownload",
            Category::Color => "ColorToDownload",
            Category::Signal => "SignalToDownload",
            Category::DistanceIcon => "DistanceIconToDownload",
        }
    }

    /// Store key the engine overwrites with progress strings.
    pub fn progress_key(self) -> &'static str {
        match self {
            Category::Model => "ModelDownloadProgress",
            Category::Wheel => "WheelDownloadProgress",
            Category::Icon => "IconDownloadProgress",
            Category::Sound => "SoundDownloadProgress",
            Category::Color => "ColorDownloadProgress",
            Category::Signal => "SignalDownloadProgress",
            Category::DistanceIcon => "DistanceIconDownloadProgress",
        }
    }

    /// Store key external writers set to cancel the in-flight download.
    pub fn cancel_key(self) -> &'static str {
        match self {
            Category::Model => "CancelModelDownload",
            Category::Wheel => "CancelWheelDownload",
            Category::Icon => "CancelIconDownload",
            Category::Sound => "CancelSoundDownload",
            Category::Color => "CancelColorDownload",
            Category::Signal => "CancelSignalDownload",
            Category::DistanceIcon => "CancelDistanceIconDownload",
        }
    }

    /// Published list of locally present items for this category.
    pub fn available_key(self) -> &'static str {
        match self {
            Category::Model => "AvailableModels",
            Category::Wheel => "AvailableWheels",
            Category::Icon => "AvailableIcons",
            Category::Sound => "AvailableSounds",
            Category::Color => "AvailableColors",
            Category::Signal => "AvailableSignals",
            Category::DistanceIcon => "AvailableDistanceIcons",
        }
    }

    /// Published list of remote-only items for this category.
    pub fn downloadable_key(self) -> &'static str {
        match self {
            Category::Model => "DownloadableModels",
            Category::Wheel => "DownloadableWheels",
            Category::Icon => "DownloadableIcons",
            Category::Sound => "DownloadableSounds",
            Category::Color => "DownloadableColors",
            Category::Signal => "DownloadableSignals",
            Category::DistanceIcon => "DownloadableDistanceIcons",
        }
    }

    /// Sub-directory under the themes root (None for models).
    pub fn theme_subdir(self) -> Option<&'static str> {
        match self {
            Category::Model => None,
            Category::Wheel => Some("steering_wheels"),
            Category::Icon => Some("icons"),
            Category::Sound => Some("sounds"),
            Category::Color => Some("colors"),
            Category::Signal => Some("signals"),
            Category::DistanceIcon => Some("distance_icons"),
        }
    }

    /// Directory on the mirror's asset tree.
    pub fn remote_dir(self) -> &'static str {
        match self {
            Category::Model => "Models",
            Category::Wheel => "Steering-Wheels",
            Category::Icon => "Icons",
            Category::Sound => "Sounds",
            Category::Color => "Colors",
            Category::Signal => "Signals",
            Category::DistanceIcon => "Distance-Icons",
        }
    }

    /// Candidate extensions, tried in order until one is found remotely.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Category::Model => &[".bin"],
            Category::Wheel => &[".png", ".gif"],
            _ => &[".zip"],
        }
    }

    /// Local directory holding this category's assets.
    pub fn local_dir(self, paths: &PathConfig) -> PathBuf {
        match self.theme_subdir() {
            Some(sub) => paths.themes_dir.join(sub),
            None => paths.models_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_unique_and_dense() {
        let mut seen = [false; Category::ALL.len()];
        for c in Category::ALL {
            assert!(!seen[c.index()]);
            seen[c.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn key_names_follow_category() {
        assert_eq!(Category::Model.download_key(), "ModelToDownload");
        assert_eq!(Category::Wheel.cancel_key(), "CancelWheelDownload");
        assert_eq!(
            Category::DistanceIcon.progress_key(),
            "DistanceIconDownloadProgress"
        );
    }

    #[test]
    fn local_dirs_split_models_and_themes() {
        let paths = PathConfig::default();
        assert_eq!(Category::Model.local_dir(&paths), paths.models_dir);
        assert_eq!(
            Category::Signal.local_dir(&paths),
            paths.themes_dir.join("signals")
        );
    }

    #[test]
    fn wheel_tries_png_before_gif() {
        assert_eq!(Category::Wheel.extensions(), &[".png", ".gif"]);
        assert_eq!(Category::Sound.extensions(), &[".zip"]);
    }
}
