use crate::config::{UploadConfig, SESSION_KEY};
use crate::manifest::ManifestRow;
use crate::remote::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Top,
    Subject,
    Session,
    Folder,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Top, Level::Subject, Level::Session, Level::Folder];
}

/// A level that has been entered. `handle` stays `None` until the
/// collection is resolved remotely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub handle: Option<NodeId>,
}

impl Slot {
    fn entered(name: String) -> Self {
        Self { name, handle: None }
    }
}

/// Where the manifest pass currently is in the remote hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub top: Option<Slot>,
    pub subject: Option<Slot>,
    pub session: Option<Slot>,
    pub folder: Option<Slot>,
    /// Prepended to uploaded package names.
    pub prefix: String,
}

impl Cursor {
    /// Apply one manifest row. Blank cells inherit; a supplied level clears
    /// every level below it. Entered levels come back unresolved.
    pub fn advance(&self, row: &ManifestRow, cfg: &UploadConfig) -> Cursor {
        let mut next = self.clone();
        if let Some(top) = &row.top {
            next.top = Some(Slot::entered(top.clone()));
            next.subject = None;
            next.session = None;
            next.folder = None;
            next.prefix.clear();
        }
        if let Some(subject) = &row.subject {
            let kind = next.top.as_ref().map_or("", |s| s.name.as_str());
            let name = format!("{}{}", cfg.prefix_for(kind), subject);
            next.prefix = format!("{name}_");
            next.subject = Some(Slot::entered(name));
            next.session = None;
            next.folder = None;
        }
        if let Some(session) = &row.session {
            let name = format!("{}{}", cfg.prefix_for(SESSION_KEY), session);
            next.prefix = match &next.subject {
                Some(sub) => format!("{}_{}_", sub.name, name),
                None => format!("{name}_"),
            };
            next.session = Some(Slot::entered(name));
            next.folder = None;
        }
        if let Some(folder) = &row.folder {
            next.folder = Some(Slot::entered(folder.clone()));
        }
        next
    }

    pub fn slot(&self, level: Level) -> Option<&Slot> {
        match level {
            Level::Top => self.top.as_ref(),
            Level::Subject => self.subject.as_ref(),
            Level::Session => self.session.as_ref(),
            Level::Folder => self.folder.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, level: Level) -> Option<&mut Slot> {
        match level {
            Level::Top => self.top.as_mut(),
            Level::Subject => self.subject.as_mut(),
            Level::Session => self.session.as_mut(),
            Level::Folder => self.folder.as_mut(),
        }
    }

    /// Entered levels still waiting for a remote handle, shallowest first.
    pub fn unresolved(&self) -> Vec<Level> {
        Level::ALL
            .into_iter()
            .filter(|l| self.slot(*l).is_some_and(|s| s.handle.is_none()))
            .collect()
    }

    /// Handle of the deepest resolved level above `level`.
    pub fn parent_of(&self, level: Level) -> Option<&NodeId> {
        Level::ALL
            .into_iter()
            .take_while(|l| *l != level)
            .filter_map(|l| self.slot(l).and_then(|s| s.handle.as_ref()))
            .last()
    }

    /// Handle uploads go to: the deepest resolved level.
    pub fn target(&self) -> Option<&NodeId> {
        Level::ALL.into_iter().rev().find_map(|l| self.slot(l).and_then(|s| s.handle.as_ref()))
    }

    /// Display path of the current destination, `/`-joined.
    pub fn dest_path(&self) -> String {
        Level::ALL
            .into_iter()
            .filter_map(|l| self.slot(l).map(|s| s.name.as_str()))
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(top: &str, sub: &str, ses: &str, fold: &str) -> ManifestRow {
        let f = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        ManifestRow { line: 0, top: f(top), subject: f(sub), session: f(ses), folder: f(fold), source: None }
    }

    #[test]
    fn subject_prefix_follows_top_kind() {
        let cfg = UploadConfig::default();
        let c = Cursor::default().advance(&row("primary", "S01", "", "anat"), &cfg);
        assert_eq!(c.dest_path(), "primary/sub-S01/anat");
        assert_eq!(c.prefix, "sub-S01_");
        let c = c.advance(&row("", "", "1", ""), &cfg);
        assert_eq!(c.dest_path(), "primary/sub-S01/ses-1");
        assert_eq!(c.prefix, "sub-S01_ses-1_");
    }

    #[test]
    fn top_change_resets_deeper_levels_and_prefix() {
        let cfg = UploadConfig::default();
        let c = Cursor::default().advance(&row("primary", "S01", "2", "eeg"), &cfg);
        let c = c.advance(&row("docs", "", "", ""), &cfg);
        assert_eq!(c.dest_path(), "docs");
        assert!(c.prefix.is_empty());
        assert_eq!(c.unresolved(), vec![Level::Top]);
    }

    #[test]
    fn target_is_deepest_resolved() {
        let cfg = UploadConfig::default();
        let mut c = Cursor::default().advance(&row("primary", "S01", "", "anat"), &cfg);
        c.top.as_mut().unwrap().handle = Some("t".into());
        c.subject.as_mut().unwrap().handle = Some("s".into());
        assert_eq!(c.parent_of(Level::Folder), Some(&"s".to_string()));
        assert_eq!(c.target(), Some(&"s".to_string()));
        c.folder.as_mut().unwrap().handle = Some("f".into());
        assert_eq!(c.target(), Some(&"f".to_string()));
    }
}
