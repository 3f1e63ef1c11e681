use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use git2::Oid;
use parking_lot::Mutex;

use crate::domain::Commit;
use crate::error::{ReleaseError, Result};
use crate::git::{MergeOutcome, RefName, RefUpdate, RemoteState, Repository};

#[derive(Debug, Clone)]
struct MockCommit {
    parents: Vec<Oid>,
    message: String,
    files: BTreeMap<String, String>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct ScheduledMove {
    after_reads: usize,
    branch: String,
    target: Oid,
}

#[derive(Debug, Default)]
struct MockState {
    next_seq: u64,
    commits: HashMap<Oid, MockCommit>,
    remote_branches: BTreeMap<String, Oid>,
    remote_tags: BTreeMap<String, Oid>,
    local_tags: BTreeMap<String, (Oid, String)>,
    rejected_refs: HashSet<String>,
    scheduled_moves: Vec<ScheduledMove>,
    remote_reads: usize,
    fetches: usize,
    pushes: usize,
}

impl MockState {
    fn next_oid(&mut self) -> (Oid, u64) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&seq.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_be_bytes());
        bytes[8..16].copy_from_slice(&seq.to_be_bytes());
        (Oid::from_bytes(&bytes).unwrap_or_else(|_| Oid::zero()), seq)
    }

    fn insert_commit(
        &mut self,
        parents: Vec<Oid>,
        message: &str,
        files: BTreeMap<String, String>,
    ) -> Oid {
        let (oid, seq) = self.next_oid();
        self.commits.insert(
            oid,
            MockCommit {
                parents,
                message: message.to_string(),
                files,
                seq,
            },
        );
        oid
    }

    fn get(&self, oid: Oid) -> Result<&MockCommit> {
        self.commits
            .get(&oid)
            .ok_or_else(|| ReleaseError::history_unavailable(oid.to_string()))
    }

    fn ancestors(&self, oid: Oid) -> HashSet<Oid> {
        let mut seen = HashSet::new();
        let mut stack = vec![oid];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(commit) = self.commits.get(&current) {
                stack.extend(commit.parents.iter().copied());
            }
        }
        seen
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> bool {
        self.ancestors(descendant).contains(&ancestor)
    }

    /// Most recent common ancestor, by creation order
    fn merge_base(&self, a: Oid, b: Oid) -> Option<Oid> {
        let theirs = self.ancestors(b);
        self.ancestors(a)
            .into_iter()
            .filter(|oid| theirs.contains(oid))
            .max_by_key(|oid| self.commits.get(oid).map(|c| c.seq).unwrap_or(0))
    }

    fn to_commit(&self, oid: Oid) -> Result<Commit> {
        let commit = self.get(oid)?;
        Ok(Commit {
            hash: oid,
            message: commit.message.clone(),
            parents: commit.parents.clone(),
        })
    }

    fn apply_scheduled_moves(&mut self) {
        let reads = self.remote_reads;
        let (due, pending): (Vec<_>, Vec<_>) = self
            .scheduled_moves
            .drain(..)
            .partition(|m| m.after_reads <= reads);
        self.scheduled_moves = pending;
        for scheduled in due {
            self.remote_branches.insert(scheduled.branch, scheduled.target);
        }
    }
}

/// In-memory commit graph plus a simulated remote, for testing
///
/// Clones share the same state, so one clone can be handed to the code under
/// test while another inspects the result. Commits carry a full file
/// snapshot, which lets merges and changelog commits behave like the real
/// thing without any git objects on disk.
#[derive(Debug, Clone, Default)]
pub struct MockRepository {
    state: Arc<Mutex<MockState>>,
}

impl MockRepository {
    /// Create a new empty mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit whose files are the first parent's files with `changes` applied
    pub fn commit(&self, parents: &[Oid], message: &str, changes: &[(&str, &str)]) -> Oid {
        let mut state = self.state.lock();
        let mut files = parents
            .first()
            .and_then(|parent| state.commits.get(parent))
            .map(|parent| parent.files.clone())
            .unwrap_or_default();
        for (path, contents) in changes {
            files.insert(path.to_string(), contents.to_string());
        }
        state.insert_commit(parents.to_vec(), message, files)
    }

    pub fn set_remote_branch(&self, name: &str, oid: Oid) {
        self.state
            .lock()
            .remote_branches
            .insert(name.to_string(), oid);
    }

    pub fn set_remote_tag(&self, name: &str, oid: Oid) {
        self.state.lock().remote_tags.insert(name.to_string(), oid);
    }

    pub fn remote_branch(&self, name: &str) -> Option<Oid> {
        self.state.lock().remote_branches.get(name).copied()
    }

    pub fn remote_tag(&self, name: &str) -> Option<Oid> {
        self.state.lock().remote_tags.get(name).copied()
    }

    pub fn remote_tags(&self) -> Vec<String> {
        self.state.lock().remote_tags.keys().cloned().collect()
    }

    /// Target and message of a local annotated tag
    pub fn local_tag(&self, name: &str) -> Option<(Oid, String)> {
        self.state.lock().local_tags.get(name).cloned()
    }

    pub fn file_at(&self, commit: Oid, path: &str) -> Option<String> {
        self.state
            .lock()
            .commits
            .get(&commit)
            .and_then(|c| c.files.get(path).cloned())
    }

    pub fn message_of(&self, commit: Oid) -> Option<String> {
        self.state
            .lock()
            .commits
            .get(&commit)
            .map(|c| c.message.clone())
    }

    pub fn parents_of(&self, commit: Oid) -> Vec<Oid> {
        self.state
            .lock()
            .commits
            .get(&commit)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    /// Make the remote refuse every push of `reference` (a full ref name)
    pub fn reject_push(&self, reference: &str) {
        self.state
            .lock()
            .rejected_refs
            .insert(reference.to_string());
    }

    pub fn allow_push(&self, reference: &str) {
        self.state.lock().rejected_refs.remove(reference);
    }

    /// Move a remote branch once `after_reads` remote reads have been served,
    /// simulating a concurrent writer
    pub fn schedule_remote_move(&self, after_reads: usize, branch: &str, target: Oid) {
        self.state.lock().scheduled_moves.push(ScheduledMove {
            after_reads,
            branch: branch.to_string(),
            target,
        });
    }

    pub fn remote_reads(&self) -> usize {
        self.state.lock().remote_reads
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    pub fn push_count(&self) -> usize {
        self.state.lock().pushes
    }
}

impl Repository for MockRepository {
    fn fetch(&self) -> Result<()> {
        self.state.lock().fetches += 1;
        Ok(())
    }

    fn remote_state(&self) -> Result<RemoteState> {
        let mut state = self.state.lock();
        state.apply_scheduled_moves();
        state.remote_reads += 1;

        Ok(RemoteState {
            branches: state.remote_branches.clone(),
            tags: state.remote_tags.clone(),
        })
    }

    fn resolve(&self, revision: &str) -> Result<Option<Oid>> {
        let state = self.state.lock();
        let branch = revision.strip_prefix("origin/").unwrap_or(revision);

        if let Some(oid) = state.remote_branches.get(branch) {
            return Ok(Some(*oid));
        }
        if let Some(oid) = state.remote_tags.get(revision) {
            return Ok(Some(*oid));
        }
        if let Some((oid, _)) = state.local_tags.get(revision) {
            return Ok(Some(*oid));
        }

        Ok(Oid::from_str(revision)
            .ok()
            .filter(|oid| state.commits.contains_key(oid)))
    }

    fn find_commit(&self, oid: Oid) -> Result<Commit> {
        self.state.lock().to_commit(oid)
    }

    fn commits_between(&self, source: Oid, target: Option<Oid>) -> Result<Vec<Commit>> {
        let state = self.state.lock();
        state.get(source)?;

        let hidden = target.map(|t| state.ancestors(t)).unwrap_or_default();
        let mut oids: Vec<Oid> = state
            .ancestors(source)
            .into_iter()
            .filter(|oid| !hidden.contains(oid))
            .collect();
        oids.sort_by_key(|oid| state.commits.get(oid).map(|c| c.seq).unwrap_or(0));

        oids.into_iter().map(|oid| state.to_commit(oid)).collect()
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Ok(self.state.lock().is_ancestor(ancestor, descendant))
    }

    fn merge(&self, target: Oid, source: Oid, message: &str) -> Result<MergeOutcome> {
        let mut state = self.state.lock();
        if state.is_ancestor(source, target) {
            return Ok(MergeOutcome::UpToDate);
        }

        let ours = state.get(target)?.files.clone();
        let theirs = state.get(source)?.files.clone();
        let base = state
            .merge_base(target, source)
            .and_then(|oid| state.commits.get(&oid))
            .map(|c| c.files.clone())
            .unwrap_or_default();

        let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
        let mut merged = BTreeMap::new();
        let mut conflicts = Vec::new();

        for path in paths {
            let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
            let resolved = if o == t || t == b {
                o
            } else if o == b {
                t
            } else {
                conflicts.push(path.clone());
                continue;
            };
            if let Some(contents) = resolved {
                merged.insert(path.clone(), contents.clone());
            }
        }

        if !conflicts.is_empty() {
            return Ok(MergeOutcome::Conflicts(conflicts));
        }

        let oid = state.insert_commit(vec![target, source], message, merged);
        Ok(MergeOutcome::Merged(oid))
    }

    fn read_file(&self, commit: Oid, path: &str) -> Result<Option<String>> {
        Ok(self.state.lock().get(commit)?.files.get(path).cloned())
    }

    fn commit_file(
        &self,
        parent: Oid,
        path: &str,
        contents: &str,
        message: &str,
    ) -> Result<Oid> {
        let mut state = self.state.lock();
        let mut files = state.get(parent)?.files.clone();
        files.insert(path.to_string(), contents.to_string());
        Ok(state.insert_commit(vec![parent], message, files))
    }

    fn create_tag(&self, name: &str, target: Oid, message: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.get(target)?;
        state
            .local_tags
            .insert(name.to_string(), (target, message.to_string()));
        Ok(())
    }

    fn push(&self, updates: &[RefUpdate]) -> Result<()> {
        let mut state = self.state.lock();
        state.pushes += 1;
        let mut rejected = Vec::new();

        for update in updates {
            let full_name = update.reference.full_name();
            if state.rejected_refs.contains(&full_name) {
                rejected.push(format!("{} (rejected by remote)", full_name));
                continue;
            }

            match &update.reference {
                RefName::Branch(name) => {
                    if let Some(current) = state.remote_branches.get(name).copied() {
                        if !state.is_ancestor(current, update.new) {
                            rejected.push(format!("{} (non-fast-forward)", full_name));
                            continue;
                        }
                    }
                    state.remote_branches.insert(name.clone(), update.new);
                }
                RefName::Tag(name) => {
                    if !state.local_tags.contains_key(name) {
                        rejected.push(format!("{} (no such local tag)", full_name));
                        continue;
                    }
                    if let Some(current) = state.remote_tags.get(name) {
                        if *current != update.new {
                            rejected.push(format!("{} (already exists)", full_name));
                        }
                        continue;
                    }
                    state.remote_tags.insert(name.clone(), update.new);
                }
            }
        }

        if !rejected.is_empty() {
            return Err(ReleaseError::PushRejected { refs: rejected });
        }

        Ok(())
    }
}
