//! Definition registry: builds the definition library from the source modules
//! of the root package and its resolved dependencies
mod lowering;
mod namespace;
mod registry_error;

use std::collections::BTreeSet;
use std::sync::Arc;

use cirn::design::{DefinitionId, Library, LibraryBuilder, QualifiedName, SourceLocation};
use log::info;
use semver::Version;

pub use registry_error::RegistryError;

use crate::ast::SourceFile;
use crate::package::{PackageManifest, ResolvedPackage};
use lowering::{declare_module, BodyLowering};
use namespace::{ModuleScope, Namespace};

/// Source modules of one package
#[derive(Clone, Debug)]
pub struct PackageSources {
	pub name: String,
	/// Resolved version, absent for the local project
	pub revision: Option<Version>,
	/// Packages this one may import from
	pub dependencies: BTreeSet<String>,
	pub files: Vec<SourceFile>,
}

impl PackageSources {
	/// The project being compiled
	pub fn local(manifest: &PackageManifest, files: Vec<SourceFile>) -> Self {
		Self {
			name: manifest.name.clone(),
			revision: None,
			dependencies: manifest.dependencies.keys().cloned().collect(),
			files,
		}
	}
}

impl From<&ResolvedPackage> for PackageSources {
	fn from(package: &ResolvedPackage) -> Self {
		Self {
			name: package.name.clone(),
			revision: Some(package.version.clone()),
			dependencies: package.dependencies().keys().cloned().collect(),
			files: package.tree.files.clone(),
		}
	}
}

/// Validated library together with the package it was built for
pub struct Registry {
	root: String,
	library: Arc<Library>,
}

impl Registry {
	pub fn build(root: &str, packages: &[PackageSources]) -> Result<Self, RegistryError> {
		let namespace = Namespace::new(packages)?;
		let mut builder = LibraryBuilder::new();

		for (package, module, file) in namespace.modules() {
			declare_module(&mut builder, package, module, file)?;
		}

		for (package, _, file) in namespace.modules() {
			let lowered = {
				let scope = ModuleScope::new(&namespace, package, file, &builder)?;
				BodyLowering { scope: &scope }.lower(file)?
			};
			for definition in lowered {
				definition.apply(&mut builder)?;
			}
		}

		let library = builder.build()?;
		info!(
			"Registry for `{}` built from {} packages and {} modules",
			root,
			packages.len(),
			namespace.modules().count()
		);

		Ok(Self {
			root: root.into(),
			library: Arc::new(library),
		})
	}

	pub fn library(&self) -> Arc<Library> {
		self.library.clone()
	}

	pub fn lookup(&self, name: &QualifiedName) -> Option<DefinitionId> {
		self.library.lookup(name)
	}

	/// Finds `module:Name` in the root package
	pub fn entry(&self, module: &str, name: &str) -> Result<DefinitionId, RegistryError> {
		self.lookup(&QualifiedName::new(&self.root, module, name))
			.ok_or_else(|| RegistryError::UnknownDefinition {
				name: format!("{}:{}", module, name),
				location: SourceLocation::default(),
			})
	}
}
