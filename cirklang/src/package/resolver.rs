use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use cirn::design::find_cycle;
use cirn::elab::CancellationToken;
use itertools::Itertools;
use log::{debug, info, warn};
use petgraph::graphmap::DiGraphMap;
use rayon::prelude::*;
use semver::{Version, VersionReq};

use super::package_error::DependencyConflictError;
use super::{LockedPackage, Lockfile, PackageError, PackageManifest, PackageProvider, Requirement, RevisionCache, SourceTree};
use crate::config::FetchConfig;

/// Resolution rounds before giving up on selections that keep changing
const MAX_ROUNDS: usize = 64;

/// A package revision selected and fetched by the resolver
#[derive(Clone, Debug)]
pub struct ResolvedPackage {
	pub name: String,
	pub version: Version,
	pub checksum: String,
	pub tree: Arc<SourceTree>,
}

impl ResolvedPackage {
	pub fn dependencies(&self) -> &BTreeMap<String, VersionReq> {
		&self.tree.manifest.dependencies
	}
}

#[derive(Clone, Debug)]
pub struct Resolution {
	pub lock: Lockfile,
	pub packages: BTreeMap<String, ResolvedPackage>,
}

type Requirements = BTreeMap<String, Vec<Requirement>>;

/// Turns version constraints into a lock and fetched source trees
pub struct Resolver {
	provider: Arc<dyn PackageProvider>,
	cache: Arc<RevisionCache>,
	fetch: FetchConfig,
}

impl Resolver {
	pub fn new(provider: Arc<dyn PackageProvider>, cache: Arc<RevisionCache>, fetch: FetchConfig) -> Self {
		Self { provider, cache, fetch }
	}

	/// Resolves the dependencies of `root` transitively. Locked versions are kept
	/// as long as they satisfy every constraint placed on them.
	pub fn resolve(
		&self,
		root: &PackageManifest,
		lock: &Lockfile,
		cancel: &CancellationToken,
	) -> Result<Resolution, PackageError> {
		let mut packages: BTreeMap<String, ResolvedPackage> = BTreeMap::new();
		let mut selection: BTreeMap<String, Version> = BTreeMap::new();
		for round in 0..MAX_ROUNDS {
			if cancel.is_cancelled() {
				return Err(PackageError::Cancelled);
			}

			let (requirements, failure) = self.settle(root, &packages, &mut selection, lock)?;
			packages.retain(|name, package| selection.get(name) == Some(&package.version));
			let missing: Vec<(String, Version)> = selection
				.iter()
				.filter(|(name, _)| !packages.contains_key(*name))
				.map(|(name, version)| (name.clone(), version.clone()))
				.collect();

			if missing.is_empty() {
				if let Some(e) = failure {
					return Err(e);
				}
				Self::check_cycles(root, &packages)?;
				info!("Resolved {} packages in {} rounds", packages.len(), round + 1);
				let lock = Self::lock(&packages, &requirements);
				return Ok(Resolution { lock, packages });
			}

			debug!(
				"Round {}: fetching {}",
				round,
				missing.iter().map(|(n, v)| format!("{}@{}", n, v)).join(", ")
			);

			// Results keep the order of `missing`, so the first error is deterministic
			let fetched: Vec<Result<ResolvedPackage, PackageError>> = if self.fetch.parallel {
				missing.par_iter().map(|(n, v)| self.fetch_revision(n, v, lock)).collect()
			}
			else {
				missing.iter().map(|(n, v)| self.fetch_revision(n, v, lock)).collect()
			};

			for package in fetched {
				let package = package?;
				packages.insert(package.name.clone(), package);
			}
		}

		Err(PackageError::Unsettled(MAX_ROUNDS))
	}

	/// Reselects packages until the selection stops changing. Only packages whose
	/// fetched revision is the selected one contribute constraints, so a revision
	/// that is about to be replaced never constrains anything.
	///
	/// A package that cannot be selected keeps its previous selection. Its error is
	/// returned alongside, since fetching the rest of the graph may still resolve it.
	fn settle(
		&self,
		root: &PackageManifest,
		packages: &BTreeMap<String, ResolvedPackage>,
		selection: &mut BTreeMap<String, Version>,
		lock: &Lockfile,
	) -> Result<(Requirements, Option<PackageError>), PackageError> {
		for _ in 0..MAX_ROUNDS {
			let requirements = Self::requirements(root, packages, selection);
			let mut next = BTreeMap::new();
			let mut failure = None;
			for (name, requirements) in &requirements {
				match self.select(name, requirements, lock) {
					Ok(version) => {
						next.insert(name.clone(), version);
					},
					Err(e) => {
						if let Some(previous) = selection.get(name) {
							next.insert(name.clone(), previous.clone());
						}
						failure.get_or_insert(e);
					},
				}
			}

			if next == *selection {
				return Ok((requirements, failure));
			}
			*selection = next;
		}

		Err(PackageError::Unsettled(MAX_ROUNDS))
	}

	/// Constraints on every package reachable from the root through selected
	/// revisions, requesters sorted by name
	fn requirements(
		root: &PackageManifest,
		packages: &BTreeMap<String, ResolvedPackage>,
		selection: &BTreeMap<String, Version>,
	) -> Requirements {
		let mut requirements = Requirements::new();
		let mut visited: BTreeSet<&str> = BTreeSet::new();
		let mut queue = VecDeque::from([(&root.name, &root.dependencies)]);

		while let Some((requester, dependencies)) = queue.pop_front() {
			for (name, constraint) in dependencies {
				// Imports of the root package only matter for cycle detection
				if name == &root.name {
					continue;
				}
				requirements.entry(name.clone()).or_default().push(Requirement {
					requester: requester.clone(),
					constraint: constraint.clone(),
				});

				if !visited.insert(name.as_str()) {
					continue;
				}
				if let Some(package) = packages.get(name).filter(|p| selection.get(name) == Some(&p.version)) {
					queue.push_back((&package.name, package.dependencies()));
				}
			}
		}

		for list in requirements.values_mut() {
			list.sort_by(|a, b| a.requester.cmp(&b.requester));
		}
		requirements
	}

	fn select(&self, name: &str, requirements: &[Requirement], lock: &Lockfile) -> Result<Version, PackageError> {
		let satisfies_all = |v: &Version| requirements.iter().all(|r| r.constraint.matches(v));

		if let Some(locked) = lock.get(name) {
			if satisfies_all(&locked.version) {
				debug!("Keeping locked {}@{}", name, locked.version);
				return Ok(locked.version.clone());
			}
			debug!("Locked {}@{} no longer satisfies all constraints", name, locked.version);
		}

		let first_requester = requirements.first().map(|r| r.requester.clone()).unwrap_or_default();
		let available = self.provider.list_versions(name).map_err(|e| match e {
			PackageError::PackageNotFound { name, .. } => PackageError::PackageNotFound {
				name,
				requested_by: first_requester.clone(),
			},
			e => e,
		})?;

		if let Some(version) = available.iter().filter(|v| satisfies_all(*v)).max() {
			return Ok(version.clone());
		}

		if let Some(r) = requirements.iter().find(|r| !available.iter().any(|v| r.constraint.matches(v))) {
			return Err(PackageError::NoMatchingVersion {
				name: name.into(),
				constraint: r.constraint.clone(),
				requested_by: r.requester.clone(),
				available,
			});
		}

		let compatible =
			|a: &Requirement, b: &Requirement| available.iter().any(|v| a.constraint.matches(v) && b.constraint.matches(v));
		let pair = requirements
			.iter()
			.tuple_combinations()
			.find(|(a, b)| !compatible(*a, *b))
			.or_else(|| requirements.iter().tuple_combinations().next());

		match pair {
			Some((first, second)) => Err(PackageError::DependencyConflict(Box::new(DependencyConflictError {
				name: name.into(),
				first: first.clone(),
				second: second.clone(),
				available,
			}))),
			None => Err(PackageError::PackageNotFound {
				name: name.into(),
				requested_by: first_requester,
			}),
		}
	}

	fn fetch_revision(&self, name: &str, version: &Version, lock: &Lockfile) -> Result<ResolvedPackage, PackageError> {
		let tree = match self.cache.get(name, version) {
			Some(tree) => tree,
			None => self.cache.insert(self.fetch_with_retries(name, version)?),
		};

		let checksum = tree.checksum();
		if let Some(locked) = lock.get(name).filter(|l| &l.version == version) {
			if locked.checksum != checksum {
				self.cache.invalidate(name, version);
				return Err(PackageError::ChecksumMismatch {
					name: name.into(),
					version: version.clone(),
					expected: locked.checksum.clone(),
					found: checksum,
				});
			}
		}

		Ok(ResolvedPackage {
			name: name.into(),
			version: version.clone(),
			checksum,
			tree,
		})
	}

	fn fetch_with_retries(&self, name: &str, version: &Version) -> Result<SourceTree, PackageError> {
		let attempts = self.fetch.retries + 1;
		for attempt in 0..attempts {
			if attempt > 0 {
				let delay = self.fetch.backoff(attempt - 1);
				warn!("Fetching {}@{} timed out, retrying in {:?}", name, version, delay);
				thread::sleep(delay);
			}

			match self.fetch_once(name, version) {
				Err(e) if e.is_retryable() => continue,
				result => return result,
			}
		}

		Err(PackageError::FetchTimeout {
			name: name.into(),
			version: version.clone(),
			attempts,
			timeout_ms: self.fetch.timeout_ms,
		})
	}

	/// Runs one fetch on a worker thread and waits for it at most the configured timeout
	fn fetch_once(&self, name: &str, version: &Version) -> Result<SourceTree, PackageError> {
		let (tx, rx) = mpsc::channel();
		let provider = self.provider.clone();
		let (worker_name, worker_version) = (name.to_string(), version.clone());
		// The worker is detached. After a timeout it finishes on its own and its result is dropped.
		thread::spawn(move || {
			let _ = tx.send(provider.fetch(&worker_name, &worker_version));
		});

		match rx.recv_timeout(self.fetch.timeout()) {
			Ok(result) => result,
			Err(RecvTimeoutError::Timeout) => Err(PackageError::FetchTimeout {
				name: name.into(),
				version: version.clone(),
				attempts: 1,
				timeout_ms: self.fetch.timeout_ms,
			}),
			Err(RecvTimeoutError::Disconnected) => Err(PackageError::FetchFailed {
				name: name.into(),
				version: version.clone(),
				reason: "fetch worker exited unexpectedly".into(),
			}),
		}
	}

	fn check_cycles(root: &PackageManifest, packages: &BTreeMap<String, ResolvedPackage>) -> Result<(), PackageError> {
		let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
		graph.add_node(root.name.as_str());
		for name in packages.keys() {
			graph.add_node(name.as_str());
		}

		let edges = std::iter::once((&root.name, &root.dependencies))
			.chain(packages.values().map(|p| (&p.name, p.dependencies())));
		for (from, dependencies) in edges {
			for to in dependencies.keys() {
				graph.add_edge(from.as_str(), to.as_str(), ());
			}
		}

		match find_cycle(&graph) {
			Some(cycle) => Err(PackageError::CyclicDependency {
				cycle: cycle.into_iter().map(String::from).collect(),
			}),
			None => Ok(()),
		}
	}

	fn lock(packages: &BTreeMap<String, ResolvedPackage>, requirements: &Requirements) -> Lockfile {
		let packages = packages
			.values()
			.map(|p| {
				let requested_by = requirements
					.get(&p.name)
					.map(|r| r.iter().map(|r| r.requester.clone()).collect())
					.unwrap_or_default();
				let locked = LockedPackage {
					version: p.version.clone(),
					checksum: p.checksum.clone(),
					requested_by,
				};
				(p.name.clone(), locked)
			})
			.collect();
		Lockfile { packages }
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use super::*;
	use crate::package::MemoryProvider;

	fn req(s: &str) -> VersionReq {
		VersionReq::parse(s).unwrap()
	}

	fn ver(s: &str) -> Version {
		Version::parse(s).unwrap()
	}

	fn publish(provider: &MemoryProvider, name: &str, version: &str, dependencies: &[(&str, &str)]) {
		let mut manifest = PackageManifest::new(name, ver(version));
		for (dep, constraint) in dependencies {
			manifest = manifest.with_dependency(dep, req(constraint));
		}
		provider.publish(SourceTree::new(manifest, vec![]));
	}

	fn root(dependencies: &[(&str, &str)]) -> PackageManifest {
		let mut manifest = PackageManifest::new("board", ver("0.1.0"));
		for (dep, constraint) in dependencies {
			manifest = manifest.with_dependency(dep, req(constraint));
		}
		manifest
	}

	fn resolver(provider: &Arc<MemoryProvider>) -> Resolver {
		Resolver::new(provider.clone(), Arc::new(RevisionCache::new()), FetchConfig::default())
	}

	fn versions(resolution: &Resolution) -> Vec<(String, String)> {
		resolution
			.lock
			.packages
			.iter()
			.map(|(n, p)| (n.clone(), p.version.to_string()))
			.collect()
	}

	fn registry() -> Arc<MemoryProvider> {
		let provider = Arc::new(MemoryProvider::new());
		publish(&provider, "passives", "1.0.0", &[("base", "^1")]);
		publish(&provider, "passives", "1.2.0", &[("base", "^1.1")]);
		publish(&provider, "passives", "2.0.0", &[("base", "^2")]);
		publish(&provider, "base", "1.0.0", &[]);
		publish(&provider, "base", "1.1.0", &[]);
		publish(&provider, "base", "2.0.0", &[]);
		publish(&provider, "connectors", "1.0.0", &[]);
		provider
	}

	#[test]
	fn test_transitive_resolution() {
		let provider = registry();
		let resolution = resolver(&provider)
			.resolve(&root(&[("passives", "^1")]), &Lockfile::default(), &CancellationToken::new())
			.unwrap();

		assert_eq!(
			versions(&resolution),
			vec![
				("base".to_string(), "1.1.0".to_string()),
				("passives".to_string(), "1.2.0".to_string())
			]
		);
		let base = &resolution.lock.packages["base"];
		assert_eq!(base.requested_by.iter().collect::<Vec<_>>(), vec!["passives"]);
		assert_eq!(base.checksum, resolution.packages["base"].tree.checksum());
	}

	#[test]
	fn test_resolution_is_reproducible() {
		let provider = registry();
		let root = root(&[("passives", "^1"), ("connectors", "*")]);
		let first = resolver(&provider)
			.resolve(&root, &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		let second = resolver(&provider)
			.resolve(&root, &first.lock, &CancellationToken::new())
			.unwrap();
		assert_eq!(first.lock, second.lock);
		assert_eq!(first.lock.to_yaml().unwrap(), second.lock.to_yaml().unwrap());
	}

	#[test]
	fn test_locked_versions_are_preferred() {
		let provider = registry();
		let root = root(&[("passives", "^1"), ("connectors", "^1")]);
		let old = resolver(&provider)
			.resolve(&root, &Lockfile::default(), &CancellationToken::new())
			.unwrap();

		publish(&provider, "connectors", "1.1.0", &[]);
		publish(&provider, "passives", "1.3.0", &[("base", "^1.1")]);
		publish(&provider, "base", "1.2.0", &[]);

		// Only the changed constraint may move its package
		let changed = crate::package::PackageManifest::new("board", ver("0.1.0"))
			.with_dependency("passives", req("^1"))
			.with_dependency("connectors", req("^1.1"));
		let new = resolver(&provider)
			.resolve(&changed, &old.lock, &CancellationToken::new())
			.unwrap();

		assert_eq!(new.lock.packages["connectors"].version, ver("1.1.0"));
		assert_eq!(new.lock.packages["passives"], old.lock.packages["passives"]);
		assert_eq!(new.lock.packages["base"], old.lock.packages["base"]);
	}

	#[test]
	fn test_conflict_names_both_requesters() {
		let provider = registry();
		publish(&provider, "sensors", "1.0.0", &[("base", "^2")]);
		let result = resolver(&provider).resolve(
			&root(&[("passives", "=1.0.0"), ("sensors", "^1")]),
			&Lockfile::default(),
			&CancellationToken::new(),
		);

		match result {
			Err(PackageError::DependencyConflict(conflict)) => {
				assert_eq!(conflict.name, "base");
				assert_eq!(conflict.first.requester, "passives");
				assert_eq!(conflict.first.constraint, req("^1"));
				assert_eq!(conflict.second.requester, "sensors");
				assert_eq!(conflict.second.constraint, req("^2"));
			},
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_replaced_revisions_do_not_constrain() {
		let provider = Arc::new(MemoryProvider::new());
		publish(&provider, "a", "1.0.0", &[("c", "^1")]);
		publish(&provider, "a", "1.1.0", &[("c", "^2")]);
		publish(&provider, "b", "1.0.0", &[("a", "=1.0.0"), ("c", "^1")]);
		publish(&provider, "c", "1.0.0", &[]);
		publish(&provider, "c", "2.0.0", &[]);

		let resolution = resolver(&provider)
			.resolve(&root(&[("a", "^1"), ("b", "^1")]), &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		assert_eq!(
			versions(&resolution),
			vec![
				("a".to_string(), "1.0.0".to_string()),
				("b".to_string(), "1.0.0".to_string()),
				("c".to_string(), "1.0.0".to_string())
			]
		);
		let c = &resolution.lock.packages["c"];
		assert_eq!(c.requested_by.iter().collect::<Vec<_>>(), vec!["a", "b"]);
	}

	#[test]
	fn test_lock_only_holds_reachable_packages() {
		let provider = Arc::new(MemoryProvider::new());
		publish(&provider, "a", "1.0.0", &[]);
		publish(&provider, "a", "1.1.0", &[("x", "^1")]);
		publish(&provider, "x", "1.0.0", &[("d", "^1")]);
		publish(&provider, "d", "1.0.0", &[]);
		publish(&provider, "b", "1.0.0", &[("e", "^1")]);
		publish(&provider, "e", "1.0.0", &[("a", "=1.0.0")]);

		let resolution = resolver(&provider)
			.resolve(&root(&[("a", "^1"), ("b", "^1")]), &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		assert_eq!(resolution.lock.packages.keys().collect::<Vec<_>>(), vec!["a", "b", "e"]);
		assert_eq!(resolution.lock.packages["a"].version, ver("1.0.0"));
		for locked in resolution.lock.packages.values() {
			for requester in &locked.requested_by {
				assert!(requester == "board" || resolution.lock.packages.contains_key(requester));
			}
		}
		assert_eq!(
			resolution.packages.keys().collect::<Vec<_>>(),
			resolution.lock.packages.keys().collect::<Vec<_>>()
		);
	}

	#[test]
	fn test_missing_packages_and_versions() {
		let provider = registry();
		let result = resolver(&provider).resolve(&root(&[("actives", "^1")]), &Lockfile::default(), &CancellationToken::new());
		assert!(matches!(result, Err(PackageError::PackageNotFound { requested_by, .. }) if requested_by == "board"));

		let result = resolver(&provider).resolve(&root(&[("passives", "^3")]), &Lockfile::default(), &CancellationToken::new());
		assert!(matches!(result, Err(PackageError::NoMatchingVersion { available, .. }) if available.len() == 3));
	}

	#[test]
	fn test_cyclic_dependency() {
		let provider = Arc::new(MemoryProvider::new());
		publish(&provider, "b", "1.0.0", &[("a", "^1")]);
		let root = PackageManifest::new("a", ver("1.0.0")).with_dependency("b", req("^1"));

		let result = resolver(&provider).resolve(&root, &Lockfile::default(), &CancellationToken::new());
		match result {
			Err(PackageError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["a", "b", "a"]),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_cycle_between_dependencies() {
		let provider = Arc::new(MemoryProvider::new());
		publish(&provider, "x", "1.0.0", &[("y", "^1")]);
		publish(&provider, "y", "1.0.0", &[("x", "^1")]);
		let result = resolver(&provider).resolve(&root(&[("x", "^1")]), &Lockfile::default(), &CancellationToken::new());
		match result {
			Err(PackageError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["x", "y", "x"]),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_cached_revisions_skip_the_provider() {
		let provider = registry();
		let cache = Arc::new(RevisionCache::new());
		let resolver = Resolver::new(provider.clone(), cache.clone(), FetchConfig::default());
		let root = root(&[("passives", "^1")]);

		let first = resolver.resolve(&root, &Lockfile::default(), &CancellationToken::new()).unwrap();
		let (fetches, listings) = (provider.fetch_count(), provider.listing_count());
		assert_eq!(fetches, 2);

		resolver.resolve(&root, &first.lock, &CancellationToken::new()).unwrap();
		assert_eq!(provider.fetch_count(), fetches);
		assert_eq!(provider.listing_count(), listings);
		assert_eq!(cache.stats().hits, 2);
	}

	#[test]
	fn test_sequential_and_parallel_agree() {
		let provider = registry();
		let root = root(&[("passives", "^1"), ("connectors", "^1")]);
		let sequential = FetchConfig {
			parallel: false,
			..FetchConfig::default()
		};
		let a = Resolver::new(provider.clone(), Arc::new(RevisionCache::new()), sequential)
			.resolve(&root, &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		let b = resolver(&provider)
			.resolve(&root, &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		assert_eq!(a.lock, b.lock);
	}

	#[test]
	fn test_slow_fetch_is_retried() {
		let provider = registry();
		provider.delay_fetches("connectors", vec![Duration::from_millis(300)]);
		let fetch = FetchConfig {
			timeout_ms: 50,
			retries: 2,
			backoff_ms: 1,
			parallel: true,
		};
		let resolver = Resolver::new(provider.clone(), Arc::new(RevisionCache::new()), fetch);
		let resolution = resolver
			.resolve(&root(&[("connectors", "^1")]), &Lockfile::default(), &CancellationToken::new())
			.unwrap();
		assert!(resolution.packages.contains_key("connectors"));
		assert_eq!(provider.fetch_count(), 2);
	}

	#[test]
	fn test_fetch_timeout_escalates() {
		let provider = registry();
		provider.delay_fetches("connectors", vec![Duration::from_millis(300); 3]);
		let fetch = FetchConfig {
			timeout_ms: 20,
			retries: 1,
			backoff_ms: 1,
			parallel: false,
		};
		let resolver = Resolver::new(provider.clone(), Arc::new(RevisionCache::new()), fetch);
		let result = resolver.resolve(&root(&[("connectors", "^1")]), &Lockfile::default(), &CancellationToken::new());
		match result {
			Err(e @ PackageError::FetchTimeout { attempts: 2, .. }) => assert!(e.is_retryable()),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn test_tampered_revision_is_rejected() {
		let provider = registry();
		let root = root(&[("connectors", "^1")]);
		let mut lock = resolver(&provider)
			.resolve(&root, &Lockfile::default(), &CancellationToken::new())
			.unwrap()
			.lock;
		lock.packages.get_mut("connectors").unwrap().checksum = "0".repeat(64);

		let result = resolver(&provider).resolve(&root, &lock, &CancellationToken::new());
		assert!(matches!(result, Err(PackageError::ChecksumMismatch { .. })));
	}

	#[test]
	fn test_cancelled_resolution() {
		let provider = registry();
		let token = CancellationToken::new();
		token.cancel();
		let result = resolver(&provider).resolve(&root(&[("passives", "^1")]), &Lockfile::default(), &token);
		assert!(matches!(result, Err(PackageError::Cancelled)));
	}
}
