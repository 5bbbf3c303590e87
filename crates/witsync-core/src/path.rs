//! Area and iteration path remapping.
//!
//! A path is a `\`- or `/`-delimited string whose first segment is the owning
//! project. Remapping replaces that root with the target root, or nests the
//! whole path under the target root when the first segment is not the source
//! root. The result always starts with the target root; nothing is dropped.

/// Canonical segment separator used by the service.
pub const SEPARATOR: char = '\\';

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Remap `path` from `source_root` to `target_root`. Total and pure.
#[must_use]
pub fn remap_root(path: Option<&str>, source_root: &str, target_root: &str) -> String {
    let trimmed = path.unwrap_or_default().trim().trim_matches(is_separator);
    if trimmed.is_empty() {
        return target_root.to_string();
    }

    let mut segments = trimmed.split(is_separator);
    let first = segments.next().unwrap_or_default();

    let mut out = String::with_capacity(target_root.len() + trimmed.len() + 1);
    out.push_str(target_root);
    if !first.eq_ignore_ascii_case(source_root) {
        out.push(SEPARATOR);
        out.push_str(first);
    }
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

/// Path placement policy for entities created in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRemapper {
    source_root: String,
    area_root: String,
    iteration_root: String,
    force_root: bool,
}

impl PathRemapper {
    #[must_use]
    pub fn new(source_root: &str, area_root: &str, iteration_root: &str) -> Self {
        Self {
            source_root: source_root.to_string(),
            area_root: area_root.to_string(),
            iteration_root: iteration_root.to_string(),
            force_root: false,
        }
    }

    /// Place every created entity directly at the area and iteration roots.
    #[must_use]
    pub const fn with_force_root(mut self, force_root: bool) -> Self {
        self.force_root = force_root;
        self
    }

    #[must_use]
    pub fn area(&self, source_path: Option<&str>) -> String {
        self.place(source_path, &self.area_root)
    }

    #[must_use]
    pub fn iteration(&self, source_path: Option<&str>) -> String {
        self.place(source_path, &self.iteration_root)
    }

    fn place(&self, source_path: Option<&str>, root: &str) -> String {
        if self.force_root {
            root.to_string()
        } else {
            remap_root(source_path, &self.source_root, root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_root_is_replaced() {
        assert_eq!(
            remap_root(Some(r"SrcProj\TeamA\Sub"), "SrcProj", "TgtProj"),
            r"TgtProj\TeamA\Sub"
        );
    }

    #[test]
    fn root_match_is_case_insensitive() {
        assert_eq!(remap_root(Some(r"srcproj\TeamA"), "SrcProj", "TgtProj"), r"TgtProj\TeamA");
    }

    #[test]
    fn foreign_root_is_nested_not_dropped() {
        assert_eq!(
            remap_root(Some(r"Other\TeamB"), "SrcProj", "TgtProj"),
            r"TgtProj\Other\TeamB"
        );
    }

    #[test]
    fn bare_root_maps_to_target_root() {
        assert_eq!(remap_root(Some("SrcProj"), "SrcProj", "TgtProj"), "TgtProj");
    }

    #[test]
    fn empty_and_absent_paths_map_to_target_root() {
        assert_eq!(remap_root(None, "SrcProj", "TgtProj"), "TgtProj");
        assert_eq!(remap_root(Some(""), "SrcProj", "TgtProj"), "TgtProj");
        assert_eq!(remap_root(Some(r" \ "), "SrcProj", "TgtProj"), "TgtProj");
    }

    #[test]
    fn forward_slashes_are_accepted() {
        assert_eq!(
            remap_root(Some("SrcProj/Sprint 4/Week 2"), "SrcProj", "TgtProj"),
            r"TgtProj\Sprint 4\Week 2"
        );
    }

    #[test]
    fn remapper_keeps_separate_roots() {
        let remapper = PathRemapper::new("SrcProj", r"TgtProj\Imported", "TgtProj");
        assert_eq!(remapper.area(Some(r"SrcProj\TeamA")), r"TgtProj\Imported\TeamA");
        assert_eq!(remapper.iteration(Some(r"SrcProj\S1")), r"TgtProj\S1");
    }

    #[test]
    fn force_root_ignores_source_paths() {
        let remapper = PathRemapper::new("SrcProj", "Area", "Iter").with_force_root(true);
        assert_eq!(remapper.area(Some(r"SrcProj\TeamA")), "Area");
        assert_eq!(remapper.iteration(Some(r"SrcProj\S1")), "Iter");
    }
}
