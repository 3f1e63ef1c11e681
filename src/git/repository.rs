use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{
    Cred, CredentialType, Direction, ErrorCode, FetchOptions, ObjectType, Oid, PushOptions,
    RemoteCallbacks, Repository as Git2Repo, Signature, Sort, Tree,
};
use parking_lot::Mutex;

use crate::config::CommitterConfig;
use crate::domain::Commit;
use crate::error::{ReleaseError, Result};
use crate::git::{MergeOutcome, RefName, RefUpdate, RemoteState};

/// Local refs used as push sources for branch updates, so that the user's
/// own branches and working tree are never moved
const STAGING_NAMESPACE: &str = "refs/releaser";

const BLOB_MODE: i32 = 0o100644;
const TREE_MODE: i32 = 0o040000;

/// Opens [Git2Repository] handles on one repository.
///
/// Each release line task opens its own handle; handles opened from the same
/// workspace share a lock that serializes fetches.
#[derive(Debug, Clone)]
pub struct Git2Workspace {
    path: PathBuf,
    remote: String,
    committer: CommitterConfig,
    fetch_lock: Arc<Mutex<()>>,
}

impl Git2Workspace {
    pub fn new(path: impl Into<PathBuf>, remote: impl Into<String>, committer: CommitterConfig) -> Self {
        Git2Workspace {
            path: path.into(),
            remote: remote.into(),
            committer,
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open or discover the git repository at the workspace path
    pub fn open(&self) -> Result<Git2Repository> {
        let repo = Git2Repo::discover(&self.path)?;

        Ok(Git2Repository {
            repo,
            remote: self.remote.clone(),
            committer: self.committer.clone(),
            fetch_lock: Arc::clone(&self.fetch_lock),
        })
    }
}

/// Wrapper around git2::Repository with our trait interface
pub struct Git2Repository {
    repo: Git2Repo,
    remote: String,
    committer: CommitterConfig,
    fetch_lock: Arc<Mutex<()>>,
}

/// Credential callbacks for fetch, ls-remote and push.
///
/// Tries the SSH agent, then git's configured credential helper, then the
/// default credentials.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|url, username_from_url, allowed_types| {
        if allowed_types.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Ok(config) = git2::Config::open_default() {
                return Cred::credential_helper(&config, url, username_from_url);
            }
        }

        Cred::default()
    });
    callbacks
}

fn to_commit(commit: &git2::Commit<'_>) -> Commit {
    Commit {
        hash: commit.id(),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        parents: commit.parent_ids().collect(),
    }
}

impl Git2Repository {
    fn find_remote(&self) -> Result<git2::Remote<'_>> {
        self.repo.find_remote(&self.remote).map_err(|e| {
            ReleaseError::remote(format!("Cannot find remote '{}': {}", self.remote, e))
        })
    }

    fn signature(&self) -> Result<Signature<'static>> {
        Ok(Signature::now(&self.committer.name, &self.committer.email)?)
    }

    fn revparse_commit(&self, revision: &str) -> Result<Option<Oid>> {
        match self.repo.revparse_single(revision) {
            Ok(object) => Ok(Some(object.peel_to_commit()?.id())),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Peel an advertised tag to its commit using local objects, when present
    fn peel_local(&self, oid: Oid) -> Oid {
        self.repo
            .find_object(oid, None)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.id())
            .unwrap_or(oid)
    }

    /// Write `blob` at `components` below `tree`, returning the new tree id
    fn write_path(&self, tree: Option<&Tree<'_>>, components: &[&str], blob: Oid) -> Result<Oid> {
        let mut builder = self.repo.treebuilder(tree)?;

        match components {
            [] => return Err(ReleaseError::config("Cannot write a file at an empty path")),
            [name] => {
                builder.insert(*name, blob, BLOB_MODE)?;
            }
            [dir, rest @ ..] => {
                let subtree = match tree.and_then(|t| t.get_name(dir)) {
                    Some(entry) if entry.kind() == Some(ObjectType::Tree) => {
                        Some(self.repo.find_tree(entry.id())?)
                    }
                    _ => None,
                };
                let subtree_oid = self.write_path(subtree.as_ref(), rest, blob)?;
                builder.insert(*dir, subtree_oid, TREE_MODE)?;
            }
        }

        Ok(builder.write()?)
    }
}

impl super::Repository for Git2Repository {
    fn fetch(&self) -> Result<()> {
        let _guard = self.fetch_lock.lock();
        let mut remote = self.find_remote()?;

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks());
        fetch_options.update_fetchhead(false);

        // - "+refs/heads/*:refs/remotes/{remote}/*" - all remote branches
        // - "+refs/tags/*:refs/tags/*" - all tags, replacing stale local ones
        let refspec_heads = format!("+refs/heads/*:refs/remotes/{}/*", self.remote);
        let refspecs = [refspec_heads.as_str(), "+refs/tags/*:refs/tags/*"];
        remote
            .fetch(&refspecs, Some(&mut fetch_options), None)
            .map_err(|e| {
                ReleaseError::remote(format!(
                    "Failed to fetch from remote '{}': {}",
                    self.remote, e
                ))
            })?;

        Ok(())
    }

    fn remote_state(&self) -> Result<RemoteState> {
        let mut remote = self.find_remote()?;
        let mut branches = BTreeMap::new();
        let mut advertised_tags = BTreeMap::new();
        let mut peeled_tags = BTreeMap::new();

        {
            let connection = remote
                .connect_auth(Direction::Fetch, Some(remote_callbacks()), None)
                .map_err(|e| {
                    ReleaseError::remote(format!(
                        "Cannot connect to remote '{}': {}",
                        self.remote, e
                    ))
                })?;

            for head in connection.list()? {
                let name = head.name();
                if let Some(branch) = name.strip_prefix("refs/heads/") {
                    branches.insert(branch.to_string(), head.oid());
                } else if let Some(tag) = name.strip_prefix("refs/tags/") {
                    match tag.strip_suffix("^{}") {
                        Some(tag) => peeled_tags.insert(tag.to_string(), head.oid()),
                        None => advertised_tags.insert(tag.to_string(), head.oid()),
                    };
                }
            }
        }

        let tags = advertised_tags
            .into_iter()
            .map(|(name, oid)| {
                let target = peeled_tags
                    .get(&name)
                    .copied()
                    .unwrap_or_else(|| self.peel_local(oid));
                (name, target)
            })
            .collect();

        Ok(RemoteState { branches, tags })
    }

    fn resolve(&self, revision: &str) -> Result<Option<Oid>> {
        if let Some(oid) = self.revparse_commit(revision)? {
            return Ok(Some(oid));
        }
        self.revparse_commit(&format!("{}/{}", self.remote, revision))
    }

    fn find_commit(&self, oid: Oid) -> Result<Commit> {
        Ok(to_commit(&self.repo.find_commit(oid)?))
    }

    fn commits_between(&self, source: Oid, target: Option<Oid>) -> Result<Vec<Commit>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(source)?;

        if let Some(target) = target {
            revwalk.hide(target)?;
        }

        let mut commits = Vec::new();
        for oid_result in revwalk {
            let commit = self.repo.find_commit(oid_result?)?;
            commits.push(to_commit(&commit));
        }

        Ok(commits)
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Ok(ancestor == descendant || self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    fn merge(&self, target: Oid, source: Oid, message: &str) -> Result<MergeOutcome> {
        if self.is_ancestor(source, target)? {
            return Ok(MergeOutcome::UpToDate);
        }

        let ours = self.repo.find_commit(target)?;
        let theirs = self.repo.find_commit(source)?;
        let mut index = self.repo.merge_commits(&ours, &theirs, None)?;

        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    paths.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            paths.sort();
            paths.dedup();
            return Ok(MergeOutcome::Conflicts(paths));
        }

        let tree_oid = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = self.signature()?;
        let oid = self
            .repo
            .commit(None, &signature, &signature, message, &tree, &[&ours, &theirs])?;

        Ok(MergeOutcome::Merged(oid))
    }

    fn read_file(&self, commit: Oid, path: &str) -> Result<Option<String>> {
        let tree = self.repo.find_commit(commit)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    fn commit_file(
        &self,
        parent: Oid,
        path: &str,
        contents: &str,
        message: &str,
    ) -> Result<Oid> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let parent = self.repo.find_commit(parent)?;
        let tree = parent.tree()?;

        let blob = self.repo.blob(contents.as_bytes())?;
        let tree_oid = self.write_path(Some(&tree), &components, blob)?;
        let tree = self.repo.find_tree(tree_oid)?;

        let signature = self.signature()?;
        Ok(self
            .repo
            .commit(None, &signature, &signature, message, &tree, &[&parent])?)
    }

    fn create_tag(&self, name: &str, target: Oid, message: &str) -> Result<()> {
        let object = self
            .repo
            .find_object(target, None)
            .map_err(|e| ReleaseError::tag(format!("Cannot find object: {}", e)))?;
        let signature = self.signature()?;

        self.repo
            .tag(name, &object, &signature, message, true)
            .map_err(|e| ReleaseError::tag(format!("Cannot create tag '{}': {}", name, e)))?;

        Ok(())
    }

    fn push(&self, updates: &[RefUpdate]) -> Result<()> {
        let mut refspecs = Vec::new();
        for update in updates {
            let local = match &update.reference {
                RefName::Branch(name) => {
                    let staged = format!("{}/{}", STAGING_NAMESPACE, name);
                    self.repo
                        .reference(&staged, update.new, true, "releaser: stage branch update")?;
                    staged
                }
                RefName::Tag(name) => format!("refs/tags/{}", name),
            };
            refspecs.push(format!("{}:{}", local, update.reference.full_name()));
        }

        let mut remote = self.find_remote()?;
        let mut rejected = Vec::new();
        {
            let mut callbacks = remote_callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejected.push(format!("{} ({})", refname, message));
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            remote
                .push(&refspecs, Some(&mut push_options))
                .map_err(|e| {
                    ReleaseError::remote(format!("Push to '{}' failed: {}", self.remote, e))
                })?;
        }

        if !rejected.is_empty() {
            return Err(ReleaseError::PushRejected { refs: rejected });
        }

        Ok(())
    }
}
