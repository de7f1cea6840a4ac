use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use ebi_core::Partial;

use crate::{store_root, write_atomic, StoreError};

const DETAILS_FILE: &str = "details.json";
const PARTIALS_DIR: &str = "partials";

/// Identifies one build record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildKey {
    pub name: String,
    pub number: String,
    pub project: Option<String>,
}

impl BuildKey {
    pub fn new(
        name: impl Into<String>,
        number: impl Into<String>,
        project: Option<String>,
    ) -> Result<Self, StoreError> {
        let (name, number) = (name.into(), number.into());
        if name.is_empty() || number.is_empty() {
            return Err(StoreError::MissingBuildParams);
        }
        Ok(Self {
            name,
            number,
            project: project.filter(|p| !p.is_empty()),
        })
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Directory name of the build under the store: hex sha256 of
    /// `name_number_project`.
    fn dir_name(&self) -> String {
        let key = format!(
            "{}_{}_{}",
            self.name,
            self.number,
            self.project.as_deref().unwrap_or_default()
        );
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

/// General details recorded once when work on a build starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralDetails {
    pub name: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// RFC 3339.
    pub started: String,
}

/// Local, unpublished build-info fragments.
///
/// Layout: `<root>/<sha256(name_number_project)>/details.json` and
/// `<root>/<...>/partials/<ulid>.json`.
#[derive(Debug, Clone)]
pub struct PartialsStore {
    root: PathBuf,
}

impl PartialsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<store_root>/builds`
    pub fn open_default() -> Self {
        Self::new(store_root().join("builds"))
    }

    pub fn build_dir(&self, build: &BuildKey) -> PathBuf {
        self.root.join(build.dir_name())
    }

    /// Record the start of the build unless it was already recorded.
    pub fn save_general_details(&self, build: &BuildKey) -> Result<PathBuf, StoreError> {
        let path = self.build_dir(build).join(DETAILS_FILE);
        if path.exists() {
            tracing::debug!(path = %path.display(), "general build details already saved");
            return Ok(path);
        }
        let details = GeneralDetails {
            name: build.name.clone(),
            number: build.number.clone(),
            project: build.project.clone().unwrap_or_default(),
            started: OffsetDateTime::now_utc().format(&Rfc3339)?,
        };
        write_json(&path, &details)?;
        Ok(path)
    }

    pub fn load_general_details(&self, build: &BuildKey) -> Result<Option<GeneralDetails>, StoreError> {
        let path = self.build_dir(build).join(DETAILS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Write one new fragment; `populate` fills in everything but the timestamp.
    pub fn save_partial(
        &self,
        build: &BuildKey,
        populate: impl FnOnce(&mut Partial),
    ) -> Result<PathBuf, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut partial = Partial {
            timestamp: (now.unix_timestamp_nanos() / 1_000_000) as i64,
            ..Default::default()
        };
        populate(&mut partial);

        let path = self
            .build_dir(build)
            .join(PARTIALS_DIR)
            .join(format!("{}.json", ulid::Ulid::new()));
        write_json(&path, &partial)?;
        tracing::debug!(path = %path.display(), "saved partial build info");
        Ok(path)
    }

    /// All fragments of a build, oldest first.
    pub fn load_partials(&self, build: &BuildKey) -> Result<Vec<Partial>, StoreError> {
        let dir = self.build_dir(build).join(PARTIALS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut partials = paths
            .iter()
            .map(|p| read_json::<Partial>(p))
            .collect::<Result<Vec<_>, _>>()?;
        // Stable: same-millisecond fragments keep file-name order.
        partials.sort_by_key(|p| p.timestamp);
        Ok(partials)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        context: path.display().to_string(),
        source,
    })?;
    write_atomic(path, &data)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        context: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebi_core::{Issues, VcsReference};

    fn key(project: Option<&str>) -> BuildKey {
        BuildKey::new("app", "12", project.map(String::from)).unwrap()
    }

    #[test]
    fn build_key_requires_name_and_number() {
        assert!(matches!(
            BuildKey::new("", "1", None),
            Err(StoreError::MissingBuildParams)
        ));
        assert!(matches!(
            BuildKey::new("app", "", None),
            Err(StoreError::MissingBuildParams)
        ));
        assert_eq!(BuildKey::new("a", "1", Some(String::new())).unwrap().project, None);
    }

    #[test]
    fn build_dir_depends_on_project() {
        let store = PartialsStore::new("/tmp/ebi-test");
        let plain = store.build_dir(&key(None));
        let scoped = store.build_dir(&key(Some("p")));
        assert_ne!(plain, scoped);
        assert_eq!(plain, store.build_dir(&key(None)));
        assert_eq!(plain.file_name().unwrap().len(), 64);
    }

    #[test]
    fn general_details_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartialsStore::new(dir.path());
        let build = key(Some("p"));

        assert!(store.load_general_details(&build).unwrap().is_none());
        store.save_general_details(&build).unwrap();
        let first = store.load_general_details(&build).unwrap().unwrap();
        assert_eq!(first.name, "app");
        assert_eq!(first.project, "p");
        assert!(OffsetDateTime::parse(&first.started, &Rfc3339).is_ok());

        store.save_general_details(&build).unwrap();
        assert_eq!(store.load_general_details(&build).unwrap().unwrap(), first);
    }

    #[test]
    fn partials_round_trip_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartialsStore::new(dir.path());
        let build = key(None);

        assert!(store.load_partials(&build).unwrap().is_empty());
        store
            .save_partial(&build, |p| {
                p.vcs.push(VcsReference {
                    url: "https://github.com/org/repo.git".into(),
                    revision: "r1".into(),
                    ..Default::default()
                })
            })
            .unwrap();
        // Distinct milliseconds, so the ordering is deterministic.
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .save_partial(&build, |p| {
                p.issues = Some(Issues {
                    aggregate_build_issues: true,
                    ..Default::default()
                })
            })
            .unwrap();

        let partials = store.load_partials(&build).unwrap();
        assert_eq!(partials.len(), 2);
        assert_eq!(partials[0].vcs[0].revision, "r1");
        assert!(partials[1].issues.as_ref().unwrap().aggregate_build_issues);
        assert!(partials[0].timestamp > 0);
        assert!(partials[0].timestamp < partials[1].timestamp);
    }
}
