use chrono::{DateTime, Utc};
use drill_core::MapperConfig;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::analyze::{is_excluded_file, Analyzer};
use crate::component::ComponentInfo;
use crate::error::MapError;
use crate::store::ComponentMap;

/// Walks a source tree and keeps the last analysis of every file, keyed by
/// path, so later scans only re-read what changed.
#[derive(Debug)]
pub struct ComponentMapper {
    root: PathBuf,
    extensions: Vec<String>,
    exclude_dirs: Vec<String>,
    analyzer: Analyzer,
    seen: HashMap<PathBuf, SystemTime>,
    components: BTreeMap<PathBuf, ComponentInfo>,
}

impl ComponentMapper {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, MapError> {
        Self::from_config(&MapperConfig {
            source_root: root.into(),
            ..MapperConfig::default()
        })
    }

    pub fn from_config(config: &MapperConfig) -> Result<Self, MapError> {
        Ok(Self {
            root: config.source_root.clone(),
            extensions: config.extensions.clone(),
            exclude_dirs: config.exclude_dirs.clone(),
            analyzer: Analyzer::new()?,
            seen: HashMap::new(),
            components: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full scan. Files that cannot be read are logged and skipped.
    pub fn discover_components(&mut self) -> Result<Vec<ComponentInfo>, MapError> {
        let files = self.source_files()?;
        self.seen.clear();
        self.components.clear();
        for (path, modified) in files {
            self.seen.insert(path.clone(), modified);
            if let Some(info) = self.analyze_file(&path, modified) {
                self.components.insert(path, info);
            }
        }
        info!(
            root = %self.root.display(),
            files = self.seen.len(),
            components = self.components.len(),
            "component discovery finished"
        );
        Ok(self.components())
    }

    /// Re-analyses files that are new or whose mtime advanced since the last
    /// scan and forgets deleted ones. Returns the re-analysed components.
    pub fn check_for_changes(&mut self) -> Result<Vec<ComponentInfo>, MapError> {
        let files = self.source_files()?;
        let current: HashMap<&PathBuf, SystemTime> =
            files.iter().map(|(path, modified)| (path, *modified)).collect();

        let removed: Vec<PathBuf> = self
            .seen
            .keys()
            .filter(|path| !current.contains_key(path))
            .cloned()
            .collect();
        for path in &removed {
            debug!(path = %path.display(), "source file removed");
            self.seen.remove(path);
            self.components.remove(path);
        }

        let mut changed = Vec::new();
        for (path, modified) in &files {
            let advanced = self
                .seen
                .get(path)
                .map_or(true, |previous| modified > previous);
            if !advanced {
                continue;
            }
            self.seen.insert(path.clone(), *modified);
            match self.analyze_file(path, *modified) {
                Some(info) => {
                    self.components.insert(path.clone(), info.clone());
                    changed.push(info);
                }
                None => {
                    self.components.remove(path);
                }
            }
        }
        info!(
            changed = changed.len(),
            removed = removed.len(),
            "incremental component scan finished"
        );
        Ok(changed)
    }

    pub fn components(&self) -> Vec<ComponentInfo> {
        self.components.values().cloned().collect()
    }

    pub fn to_map(&self) -> ComponentMap {
        ComponentMap::new(self.components())
    }

    fn analyze_file(&self, path: &Path, modified: SystemTime) -> Option<ComponentInfo> {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable source file");
                return None;
            }
        };
        let info = self
            .analyzer
            .analyze(path, &source, DateTime::<Utc>::from(modified));
        if info.is_none() {
            debug!(path = %path.display(), "no component found");
        }
        info
    }

    fn source_files(&self) -> Result<Vec<(PathBuf, SystemTime)>, MapError> {
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|source| MapError::ReadDir {
            path: self.root.clone(),
            source,
        })?;
        self.walk(entries, &mut files);
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    fn walk(&self, entries: fs::ReadDir, files: &mut Vec<(PathBuf, SystemTime)>) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let excluded = entry
                    .file_name()
                    .to_str()
                    .map_or(true, |name| self.exclude_dirs.iter().any(|dir| dir == name));
                if excluded {
                    continue;
                }
                match fs::read_dir(&path) {
                    Ok(children) => self.walk(children, files),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable directory")
                    }
                }
                continue;
            }

            if !file_type.is_file() || !self.wants(&path) {
                continue;
            }
            match entry.metadata().and_then(|meta| meta.modified()) {
                Ok(modified) => files.push((path, modified)),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping file without mtime"),
            }
        }
    }

    fn wants(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext));
        has_extension && !is_excluded_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    const MAP_VIEW: &str = r#"
interface MapViewProps {
  center: [number, number];
  zoom: number;
}

export function MapView({ center, zoom = 12 }: MapViewProps) {
  return <div data-testid="map-container" onScroll={() => null} />;
}
"#;

    const UNIT_BADGE: &str = r#"
export const UnitBadge = () => <span data-testid="unit-badge" />;
"#;

    fn write(root: &Path, relative: &str, body: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(&path, body).expect("write source");
        path
    }

    fn bump_mtime(path: &Path, seconds: u64) {
        let file = File::options().write(true).open(path).expect("open");
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
            .expect("set mtime");
    }

    #[test]
    fn discovery_skips_tests_stories_and_excluded_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "components/MapView.tsx", MAP_VIEW);
        write(dir.path(), "components/MapView.test.tsx", MAP_VIEW);
        write(dir.path(), "components/MapView.stories.tsx", MAP_VIEW);
        write(dir.path(), "node_modules/lib/Thing.tsx", UNIT_BADGE);
        write(dir.path(), "styles/map.css", ".map { height: 100%; }");

        let mut mapper = ComponentMapper::new(dir.path()).expect("mapper");
        let components = mapper.discover_components().expect("discover");

        assert_eq!(components.len(), 1);
        let map_view = &components[0];
        assert_eq!(map_view.name, "MapView");
        assert_eq!(map_view.props.len(), 2);
        assert_eq!(map_view.props[1].default_value.as_deref(), Some("12"));
        assert_eq!(map_view.test_ids, vec!["map-container"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut mapper = ComponentMapper::new(dir.path().join("absent")).expect("mapper");
        assert!(matches!(
            mapper.discover_components(),
            Err(MapError::ReadDir { .. })
        ));
    }

    #[test]
    fn check_for_changes_reports_only_new_and_touched_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let map_view = write(dir.path(), "MapView.tsx", MAP_VIEW);
        let badge = write(dir.path(), "UnitBadge.tsx", UNIT_BADGE);

        let mut mapper = ComponentMapper::new(dir.path()).expect("mapper");
        assert_eq!(mapper.discover_components().expect("discover").len(), 2);
        assert!(mapper.check_for_changes().expect("no changes").is_empty());

        bump_mtime(&map_view, 60);
        write(dir.path(), "HazardLegend.jsx", "export const HazardLegend = () => <ul />;\n");
        let changed: Vec<String> = mapper
            .check_for_changes()
            .expect("changes")
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(changed, vec!["HazardLegend", "MapView"]);

        fs::remove_file(&badge).expect("remove badge");
        assert!(mapper.check_for_changes().expect("after delete").is_empty());
        let names: Vec<String> = mapper.components().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["HazardLegend", "MapView"]);
    }
}
