use std::collections::{BTreeMap, HashMap};

use cirn::design::{DefinitionId, DefinitionKind, LibraryBuilder, QualifiedName, SourceLocation};
use log::debug;

use super::{PackageSources, RegistryError};
use crate::ast::{Import, SourceFile};

/// All modules visible to the registry, keyed by package and module name
pub(super) struct Namespace<'a> {
	packages: BTreeMap<&'a str, PackageModules<'a>>,
}

pub(super) struct PackageModules<'a> {
	pub sources: &'a PackageSources,
	pub modules: BTreeMap<String, &'a SourceFile>,
}

impl<'a> Namespace<'a> {
	pub fn new(packages: &'a [PackageSources]) -> Result<Self, RegistryError> {
		let mut result = BTreeMap::new();
		for sources in packages {
			let mut modules: BTreeMap<String, &SourceFile> = BTreeMap::new();
			for file in &sources.files {
				let module = file.module_name();
				if modules.insert(module.clone(), file).is_some() {
					return Err(RegistryError::DuplicateModule {
						package: sources.name.clone(),
						module,
						location: SourceLocation::new(&file.path, 0, 0),
					});
				}
			}
			result.insert(
				sources.name.as_str(),
				PackageModules {
					sources,
					modules,
				},
			);
		}
		Ok(Self { packages: result })
	}

	/// Modules in a stable order: packages by name, then modules by name
	pub fn modules(&self) -> impl Iterator<Item = (&'a PackageSources, &str, &'a SourceFile)> + '_ {
		self.packages
			.values()
			.flat_map(|p| p.modules.iter().map(move |(name, file)| (p.sources, name.as_str(), *file)))
	}

	/// Resolves the `from` part of an import to a `(package, module)` pair
	fn import_source(&self, package: &PackageSources, import: &Import) -> Result<(String, String), RegistryError> {
		let unknown = || RegistryError::UnknownModule {
			module: import.from.clone(),
			location: import.location.clone(),
		};

		let (target_package, module) = match import.from.split_once('/') {
			Some((dependency, module)) => {
				if dependency != package.name && !package.dependencies.contains(dependency) {
					return Err(unknown());
				}
				(dependency, module)
			},
			None => (package.name.as_str(), import.from.as_str()),
		};

		match self.packages.get(target_package) {
			Some(p) if p.modules.contains_key(module) => Ok((target_package.into(), module.into())),
			_ => Err(unknown()),
		}
	}
}

/// Name lookup inside one module: local definitions, then imports, then built-ins
pub(super) struct ModuleScope<'b> {
	package: String,
	module: String,
	imports: HashMap<String, (QualifiedName, SourceLocation)>,
	builder: &'b LibraryBuilder,
}

impl<'b> ModuleScope<'b> {
	pub fn new(
		namespace: &Namespace<'_>,
		package: &PackageSources,
		file: &SourceFile,
		builder: &'b LibraryBuilder,
	) -> Result<Self, RegistryError> {
		let module = file.module_name();
		let mut imports = HashMap::new();
		for import in &file.imports {
			let (source_package, source_module) = namespace.import_source(package, import)?;
			for name in &import.names {
				let qualified = QualifiedName::new(&source_package, &source_module, name);
				if builder.lookup(&qualified).is_none() {
					return Err(RegistryError::UnknownDefinition {
						name: format!("{}/{}::{}", source_package, source_module, name),
						location: import.location.clone(),
					});
				}
				debug!("`{}::{}` imports `{}`", package.name, module, qualified);
				imports.insert(name.clone(), (qualified, import.location.clone()));
			}
		}

		Ok(Self {
			package: package.name.clone(),
			module,
			imports,
			builder,
		})
	}

	pub fn qualify(&self, name: &str) -> QualifiedName {
		QualifiedName::new(&self.package, &self.module, name)
	}

	/// Definition declared in this module
	pub fn local(&self, name: &str) -> Option<DefinitionId> {
		self.builder.lookup(&self.qualify(name))
	}

	pub fn resolve(&self, name: &str, location: &SourceLocation) -> Result<DefinitionId, RegistryError> {
		let local = self.local(name);
		let imported = self.imports.get(name);

		match (local, imported) {
			(Some(local), Some((_, import_location))) => Err(RegistryError::AmbiguousReference {
				name: name.into(),
				local: self.builder.definition(local)?.location().clone(),
				imported: import_location.clone(),
			}),
			(Some(local), None) => Ok(local),
			(None, Some((qualified, _))) => self.builder.lookup(qualified).ok_or_else(|| RegistryError::UnknownDefinition {
				name: name.into(),
				location: location.clone(),
			}),
			(None, None) => builtin(name).ok_or_else(|| RegistryError::UnknownDefinition {
				name: name.into(),
				location: location.clone(),
			}),
		}
	}
}

fn builtin(name: &str) -> Option<DefinitionId> {
	let kind = match name {
		"Module" => DefinitionKind::Module,
		"Component" => DefinitionKind::Component,
		"Interface" => DefinitionKind::Interface,
		_ => return None,
	};
	Some(LibraryBuilder::builtin(kind))
}
