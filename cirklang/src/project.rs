//! A project on disk: configuration, local modules, lock file and the
//! pipeline from resolution to elaboration
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cirn::elab::{CancellationToken, ElabOutcome, Elaborator, FullElaborator};
use log::{debug, info};

use crate::ast::SourceFile;
use crate::config::ProjectConfig;
use crate::package::{FilesystemProvider, Lockfile, PackageManifest, PackageProvider, Resolution, Resolver, RevisionCache};
use crate::registry::{PackageSources, Registry};
use crate::CompilerError;

/// Output of one complete run
#[derive(Debug)]
pub struct Compilation {
	pub lock: Lockfile,
	pub outcome: ElabOutcome,
}

#[derive(Clone, Debug)]
pub struct Project {
	root: PathBuf,
	config: ProjectConfig,
	files: Vec<SourceFile>,
}

impl Project {
	pub fn new(root: impl Into<PathBuf>, config: ProjectConfig, mut files: Vec<SourceFile>) -> Self {
		files.sort_by(|a, b| a.path.cmp(&b.path));
		Self {
			root: root.into(),
			config,
			files,
		}
	}

	/// Loads the project containing `path` along with every `*.json` module in its source directory
	pub fn open(path: &Path) -> Result<Self, CompilerError> {
		let config_path = ProjectConfig::find(path)?;
		let config = ProjectConfig::open(&config_path)?;
		let root = config_path.parent().map(Path::to_path_buf).unwrap_or_default();

		let src = root.join(&config.paths.src);
		let mut files = vec![];
		if src.is_dir() {
			for entry in std::fs::read_dir(&src)? {
				let path = entry?.path();
				if path.extension().is_some_and(|e| e == "json") {
					debug!("Loading module {}", path.display());
					files.push(SourceFile::open(&path)?);
				}
			}
		}

		info!("Opened project `{}` with {} modules", config.name, files.len());
		Ok(Self::new(root, config, files))
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn config(&self) -> &ProjectConfig {
		&self.config
	}

	pub fn files(&self) -> &[SourceFile] {
		&self.files
	}

	pub fn manifest(&self) -> PackageManifest {
		PackageManifest::from(&self.config)
	}

	pub fn lock_path(&self) -> PathBuf {
		self.root.join(&self.config.paths.lock)
	}

	/// Resolver backed by the project's package registry directory and revision cache
	pub fn default_resolver(&self) -> Resolver {
		let provider: Arc<dyn PackageProvider> = Arc::new(FilesystemProvider::new(self.root.join(&self.config.paths.registry)));
		let cache = Arc::new(RevisionCache::with_disk(self.root.join(&self.config.paths.cache)));
		Resolver::new(provider, cache, self.config.fetch.clone())
	}

	pub fn load_lock(&self) -> Result<Lockfile, CompilerError> {
		Ok(Lockfile::open(&self.lock_path())?)
	}

	pub fn save_lock(&self, lock: &Lockfile) -> Result<(), CompilerError> {
		Ok(lock.save(&self.lock_path())?)
	}

	pub fn resolve(&self, resolver: &Resolver, cancel: &CancellationToken) -> Result<Resolution, CompilerError> {
		let lock = self.load_lock()?;
		Ok(resolver.resolve(&self.manifest(), &lock, cancel)?)
	}

	pub fn registry(&self, resolution: &Resolution) -> Result<Registry, CompilerError> {
		let mut packages = vec![PackageSources::local(&self.manifest(), self.files.clone())];
		packages.extend(resolution.packages.values().map(PackageSources::from));
		Ok(Registry::build(&self.config.name, &packages)?)
	}

	/// Elaborates `entry` (`module:Name`), falling back to the configured entry point
	pub fn elaborate(
		&self,
		registry: &Registry,
		entry: Option<&str>,
		cancel: &CancellationToken,
	) -> Result<ElabOutcome, CompilerError> {
		let (module, name) = self.config.entry_point(entry)?;
		let top = registry.entry(&module, &name)?;
		let policy = self.config.severity_policy()?;
		let mut elaborator = FullElaborator::with_policy(registry.library(), Box::new(policy));
		Ok(elaborator.elaborate(top, cancel)?)
	}

	/// Resolves, builds the registry and elaborates. The lock is returned, not saved.
	pub fn compile(
		&self,
		resolver: &Resolver,
		entry: Option<&str>,
		cancel: &CancellationToken,
	) -> Result<Compilation, CompilerError> {
		let resolution = self.resolve(resolver, cancel)?;
		let registry = self.registry(&resolution)?;
		let outcome = self.elaborate(&registry, entry, cancel)?;
		Ok(Compilation {
			lock: resolution.lock,
			outcome,
		})
	}
}
