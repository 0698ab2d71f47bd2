//! Checksum queries: plain, wildcard and filtered walks.

use super::CacheContext;
use crate::error::ChecksumError;
use crate::mount::SessionGroup;
use crate::pattern::{component_matcher, has_meta, PathFilter};
use crate::tree::hasher::compose;
use crate::tree::node::CacheRecord;
use crate::tree::path;
use crate::types::{ChecksumOpts, Digest};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// One wildcard match: the path as written by the query, the resolved path
/// and its record.
struct Match {
    logical: String,
    real: String,
    record: CacheRecord,
}

impl CacheContext {
    /// Digest of `query` under `opts`, loading whatever the query needs.
    #[instrument(skip(self, opts, session), fields(ref_id = %self.id))]
    pub async fn checksum(
        &self,
        query: &str,
        opts: &ChecksumOpts,
        session: &SessionGroup,
    ) -> Result<Digest, ChecksumError> {
        self.ensure_not_halted()?;

        let digest = if opts.wildcard {
            self.checksum_wildcard(query, opts, session).await?
        } else if opts.has_filters() {
            let filter = PathFilter::new(&opts.include_patterns, &opts.exclude_patterns)?;
            let (root, record) = self.resolve_loaded(query, true, session).await?;
            self.filtered_digest(&root, &record, &filter, session).await?
        } else {
            let (resolved, record) = self
                .resolve_loaded(query, opts.follow_links, session)
                .await?;
            self.entry_digest(&resolved, &record, session).await?
        };

        // A stream may have halted while this query ran.
        self.ensure_not_halted()?;
        debug!(path = %query, digest = %digest, "Checksum computed");
        Ok(digest)
    }

    fn ensure_not_halted(&self) -> Result<(), ChecksumError> {
        match self.halted() {
            Some(reason) => Err(ChecksumError::StreamHalted(reason)),
            None => Ok(()),
        }
    }

    /// Composed contents for directories, the leaf digest for everything else.
    async fn entry_digest(
        &self,
        p: &str,
        record: &CacheRecord,
        session: &SessionGroup,
    ) -> Result<Digest, ChecksumError> {
        if !record.is_dir() {
            return Ok(record.digest.clone());
        }
        self.ensure_scanned(p, session).await?;
        {
            let state = self.state.read();
            if let Some(cached) = state.index.get(p).and_then(|r| r.contents.clone()) {
                return Ok(cached);
            }
        }
        let mut state = self.state.write();
        state
            .index
            .composed_digest(p)
            .ok_or_else(|| ChecksumError::NotFound(p.to_string()))
    }

    /// Digest over the entries below `root` selected by `filter`, plus the
    /// directories leading to them.
    async fn filtered_digest(
        &self,
        root: &str,
        record: &CacheRecord,
        filter: &PathFilter,
        session: &SessionGroup,
    ) -> Result<Digest, ChecksumError> {
        if !record.is_dir() {
            let name = path::base(root);
            if filter.selects(name) {
                return Ok(compose(std::iter::once((name.as_bytes(), &record.digest))));
            }
            return Ok(Digest::empty());
        }

        self.ensure_scanned(root, session).await?;
        let state = self.state.read();
        let mut selected: BTreeMap<Vec<u8>, Digest> = BTreeMap::new();
        for (p, entry) in state.index.descendants(root) {
            let rel = match path::relative(root, &p) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            if !filter.selects(rel) {
                continue;
            }
            selected.insert(path::relative_key(rel), entry.digest.clone());

            let mut prefix = rel;
            while let Some(idx) = prefix.rfind('/') {
                prefix = &prefix[..idx];
                let key = path::relative_key(prefix);
                if selected.contains_key(&key) {
                    break;
                }
                if let Some(dir) = state.index.get(&path::join(root, prefix)) {
                    selected.insert(key, dir.digest.clone());
                }
            }
        }
        Ok(compose(selected.iter().map(|(k, d)| (k.as_slice(), d))))
    }

    async fn checksum_wildcard(
        &self,
        query: &str,
        opts: &ChecksumOpts,
        session: &SessionGroup,
    ) -> Result<Digest, ChecksumError> {
        let cleaned = path::clean(query);
        let matches = self
            .expand_wildcard(&cleaned, opts.follow_links, session)
            .await?;
        if matches.is_empty() {
            return Err(ChecksumError::NotFound(cleaned));
        }

        let filter = if opts.has_filters() {
            Some(PathFilter::new(&opts.include_patterns, &opts.exclude_patterns)?)
        } else {
            None
        };

        if matches.len() == 1 {
            let only = &matches[0];
            match &filter {
                Some(filter) => {
                    return self
                        .filtered_digest(&only.real, &only.record, filter, session)
                        .await
                }
                None if path::base(&only.logical) == path::base(&cleaned) => {
                    return self.entry_digest(&only.real, &only.record, session).await
                }
                None => {}
            }
        }

        // Matches compose in path order, each keyed by its own name only.
        let mut ordered: Vec<&Match> = matches.iter().collect();
        ordered.sort_by_key(|m| path::relative_key(&m.logical));
        let mut entries: Vec<(Vec<u8>, Digest)> = Vec::with_capacity(ordered.len());
        for m in ordered {
            let digest = match &filter {
                Some(filter) => {
                    self.filtered_digest(&m.real, &m.record, filter, session)
                        .await?
                }
                None => self.entry_digest(&m.real, &m.record, session).await?,
            };
            entries.push((path::base(&m.logical).as_bytes().to_vec(), digest));
        }
        Ok(compose(entries.iter().map(|(k, d)| (k.as_slice(), d))))
    }

    fn child_names(&self, dir: &str) -> Vec<String> {
        let state = self.state.read();
        let names = state.index.children(dir).into_iter().map(|(name, _)| name).collect();
        names
    }

    /// Expand glob components one level at a time. Intermediate components
    /// always follow symlinks; the final one only when `follow_final`.
    async fn expand_wildcard(
        &self,
        pattern: &str,
        follow_final: bool,
        session: &SessionGroup,
    ) -> Result<Vec<Match>, ChecksumError> {
        let components: Vec<String> = path::components(pattern).map(String::from).collect();
        if components.is_empty() {
            let (real, record) = self.resolve_loaded("/", follow_final, session).await?;
            return Ok(vec![Match {
                logical: "/".to_string(),
                real,
                record,
            }]);
        }

        let mut frontier: Vec<(String, String)> = vec![("/".to_string(), "/".to_string())];
        let mut found = Vec::new();
        for (i, component) in components.iter().enumerate() {
            let last = i + 1 == components.len();
            let mut next = Vec::new();

            for (logical, real) in &frontier {
                let names: Vec<String> = if has_meta(component) {
                    self.ensure_scanned(real, session).await?;
                    let matcher = component_matcher(component)?;
                    self.child_names(real)
                        .into_iter()
                        .filter(|name| matcher.is_match(name))
                        .collect()
                } else {
                    vec![component.clone()]
                };

                for name in names {
                    let query = path::join(real, &name);
                    match self
                        .resolve_loaded(&query, !last || follow_final, session)
                        .await
                    {
                        Ok((resolved, record)) => {
                            let logical = path::join(logical, &name);
                            if last {
                                found.push(Match {
                                    logical,
                                    real: resolved,
                                    record,
                                });
                            } else if record.is_dir() {
                                next.push((logical, resolved));
                            }
                        }
                        Err(ChecksumError::NotFound(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
            }
            frontier = next;
        }
        Ok(found)
    }
}
