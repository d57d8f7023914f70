//! Notification boundary contract.

use crate::BoxFuture;
use std::path::PathBuf;
use switch_sync_domain::{ChangeKind, TargetId, TargetKind, split_extension};
use switch_sync_shared::{RequestContext, Result};

/// One successful fetch, reported after the file is in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Target that fetched the file.
    pub target: TargetId,
    /// Content kind of the target.
    pub target_kind: TargetKind,
    /// Name shown to the user.
    pub display_name: Box<str>,
    /// Final local path.
    pub local_path: PathBuf,
    /// Whether the file was new or replaced an older copy.
    pub kind: ChangeKind,
}

impl Notification {
    /// Human-readable message, worded by media type for album captures.
    #[must_use]
    pub fn message(&self) -> String {
        let noun = self.media_noun();
        match self.kind {
            ChangeKind::New => format!("New {noun} {} has been added.", self.display_name),
            ChangeKind::Updated => {
                let mut capitalized = noun.to_owned();
                if let Some(first) = capitalized.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                format!("{capitalized} {} has been updated.", self.display_name)
            },
        }
    }

    fn media_noun(&self) -> &'static str {
        if self.target_kind != TargetKind::Screenshots {
            return "file";
        }
        let (_, extension) = split_extension(&self.display_name);
        match extension.to_ascii_lowercase().as_str() {
            ".mp4" => "video",
            ".jpg" | ".bmp" | ".png" => "image",
            _ => "file",
        }
    }
}

/// Delivers fetch notifications. Delivery failures never fail a pass.
pub trait NotifierPort: Send + Sync {
    /// Emit one notification.
    fn notify(
        &self,
        ctx: &RequestContext,
        notification: Notification,
    ) -> BoxFuture<'_, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: TargetKind, name: &str, change: ChangeKind) -> Notification {
        Notification {
            target: TargetId::screenshots(),
            target_kind: kind,
            display_name: name.into(),
            local_path: PathBuf::from("/pics").join(name),
            kind: change,
        }
    }

    #[test]
    fn capture_messages_name_the_media_type() {
        let video = notification(TargetKind::Screenshots, "clip.MP4", ChangeKind::New);
        assert_eq!(video.message(), "New video clip.MP4 has been added.");

        let image = notification(TargetKind::Screenshots, "shot.jpg", ChangeKind::Updated);
        assert_eq!(image.message(), "Image shot.jpg has been updated.");
    }

    #[test]
    fn file_sync_messages_say_file() {
        let save = notification(TargetKind::FileSync, "shot.jpg", ChangeKind::New);
        assert_eq!(save.message(), "New file shot.jpg has been added.");

        let save = notification(TargetKind::FileSync, "slot1.bin", ChangeKind::Updated);
        assert_eq!(save.message(), "File slot1.bin has been updated.");
    }
}
