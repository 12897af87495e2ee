extern crate cirklang;
use std::fs;
use std::path::{Path, PathBuf};

use cirklang::package::{Lockfile, PackageError};
use cirklang::{Compilation, CompilerError, Project};
use cirn::design::{Dimension, Value};
use cirn::elab::{CancellationToken, ElabMessageKind, ElabMessageSeverity};
use rstest::*;
use serde_json::{json, Value as Json};
use tempfile::TempDir;

/// Project directory with a local package registry next to the sources
struct Workspace {
	dir: TempDir,
}

impl Workspace {
	fn new(config: &str) -> Self {
		let workspace = Self {
			dir: tempfile::tempdir().unwrap(),
		};
		workspace.write("cirk.yaml", config);
		workspace
	}

	fn root(&self) -> &Path {
		self.dir.path()
	}

	fn write(&self, relative: &str, text: &str) {
		let path = self.root().join(relative);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, text).unwrap();
	}

	fn module(&self, module: &str, imports: Json, definitions: Json) {
		let path = format!("src/{}.json", module);
		let text = json!({"path": path, "imports": imports, "definitions": definitions});
		self.write(&path, &text.to_string());
	}

	fn publish(&self, name: &str, version: &str, dependencies: &[(&str, &str)], modules: &[(&str, Json)]) {
		let base = format!("registry/{}/{}", name, version);
		let mut manifest = format!("name: {}\nversion: {}\n", name, version);
		if !dependencies.is_empty() {
			manifest.push_str("dependencies:\n");
		}
		for (dependency, constraint) in dependencies {
			manifest.push_str(&format!("  {}: \"{}\"\n", dependency, constraint));
		}
		self.write(&format!("{}/cirk.yaml", base), &manifest);

		for (module, definitions) in modules {
			let path = format!("src/{}.json", module);
			let text = json!({"path": path, "definitions": definitions});
			self.write(&format!("{}/{}", base, path), &text.to_string());
		}
	}

	fn compile(&self) -> Result<Compilation, CompilerError> {
		let project = Project::open(self.root())?;
		let resolver = project.default_resolver();
		let compilation = project.compile(&resolver, None, &CancellationToken::new())?;
		project.save_lock(&compilation.lock)?;
		Ok(compilation)
	}

	fn lock_path(&self) -> PathBuf {
		self.root().join("cirk-lock.yaml")
	}
}

fn resistor() -> Json {
	json!({"name": "Resistor", "kind": "component", "body": [
		{"stmt": "pin", "name": "p1"},
		{"stmt": "pin", "name": "p2"},
		{"stmt": "param", "name": "resistance", "dimension": "resistance", "required": true,
			"default": {"expr": "number", "value": 1, "unit": "kΩ"}}
	]})
}

fn kilo_ohms(compilation: &Compilation, path: &str) -> f64 {
	let design = compilation.outcome.design.as_ref().unwrap();
	match design.parameter(path).and_then(|p| p.value()) {
		Some(Value::Quantity(q)) => {
			assert_eq!(q.dimension, Dimension::RESISTANCE);
			q.value / 1000.0
		},
		other => panic!("`{}` is not a resistance: {:?}", path, other),
	}
}

#[fixture]
fn divider_project() -> Workspace {
	let ws = Workspace::new("name: board\nentry: main:Board\ndependencies:\n  passives: \"^1\"\n");
	ws.publish("passives", "1.0.0", &[], &[("resistors", json!([resistor()]))]);
	ws.module(
		"main",
		json!([{"names": ["Resistor"], "from": "passives/resistors"}]),
		json!([{"name": "Board", "kind": "module", "body": [
			{"stmt": "new", "name": "R1", "class": "Resistor"},
			{"stmt": "new", "name": "R2", "class": "Resistor"},
			{"stmt": "assign", "target": "R2.resistance", "value": {"expr": "number", "value": 10, "unit": "kΩ"}},
			{"stmt": "connect", "left": "R1.p2", "right": "R2.p1"}
		]}]),
	);
	ws
}

#[rstest]
fn test_divider_end_to_end(divider_project: Workspace) {
	let compilation = divider_project.compile().unwrap();
	assert_eq!(compilation.outcome.report.count(ElabMessageSeverity::Error), 0);

	let design = compilation.outcome.design.as_ref().unwrap();
	assert_eq!(design.nets().len(), 3);
	assert_eq!(design.net_of("R1.p2").unwrap().id, design.net_of("R2.p1").unwrap().id);
	assert_ne!(design.net_of("R1.p1").unwrap().id, design.net_of("R2.p2").unwrap().id);

	assert!((kilo_ohms(&compilation, "R1.resistance") - 1.0).abs() < 1e-9);
	assert!((kilo_ohms(&compilation, "R2.resistance") - 10.0).abs() < 1e-9);

	let model = serde_json::to_value(design).unwrap();
	assert!(model.get("instances").is_some());
	assert!(model.get("nets").is_some());
}

#[rstest]
#[case(&[("R1.p2", "R2.p1"), ("R2.p2", "R3.p1"), ("R3.p2", "R1.p1")])]
#[case(&[("R3.p2", "R1.p1"), ("R1.p2", "R2.p1"), ("R2.p2", "R3.p1")])]
#[case(&[("R1.p1", "R3.p2"), ("R3.p1", "R2.p2"), ("R2.p1", "R1.p2")])]
fn test_net_partition_ignores_statement_order(#[case] connections: &[(&str, &str)]) {
	let ws = Workspace::new("name: ring\nentry: main:Ring\n");
	let mut body = vec![
		json!({"stmt": "new", "name": "R1", "class": "Resistor"}),
		json!({"stmt": "new", "name": "R2", "class": "Resistor"}),
		json!({"stmt": "new", "name": "R3", "class": "Resistor"}),
	];
	for (left, right) in connections {
		body.push(json!({"stmt": "connect", "left": left, "right": right}));
	}
	ws.module(
		"main",
		json!([]),
		json!([resistor(), {"name": "Ring", "kind": "module", "body": body}]),
	);

	let compilation = ws.compile().unwrap();
	let design = compilation.outcome.design.unwrap();
	let nets: Vec<(String, Vec<String>)> = design
		.nets()
		.iter()
		.map(|net| {
			let ports = net.ports.iter().map(|p| design.ports()[p.index()].path.to_string()).collect();
			(net.name.clone(), ports)
		})
		.collect();

	assert_eq!(
		nets,
		vec![
			("net-R1.p1".to_string(), vec!["R1.p1".to_string(), "R3.p2".to_string()]),
			("net-R1.p2".to_string(), vec!["R1.p2".to_string(), "R2.p1".to_string()]),
			("net-R2.p2".to_string(), vec!["R2.p2".to_string(), "R3.p1".to_string()]),
		]
	);
}

#[rstest]
fn test_lock_is_deterministic_and_local(divider_project: Workspace) {
	divider_project.compile().unwrap();
	let first = fs::read_to_string(divider_project.lock_path()).unwrap();
	divider_project.compile().unwrap();
	let second = fs::read_to_string(divider_project.lock_path()).unwrap();
	assert_eq!(first, second);

	// A newer compatible release does not move an existing lock
	divider_project.publish("passives", "1.1.0", &[], &[("resistors", json!([resistor()]))]);
	let compilation = divider_project.compile().unwrap();
	assert_eq!(compilation.lock.packages["passives"].version.to_string(), "1.0.0");

	// Without a lock the highest matching version is picked
	fs::remove_file(divider_project.lock_path()).unwrap();
	let compilation = divider_project.compile().unwrap();
	assert_eq!(compilation.lock.packages["passives"].version.to_string(), "1.1.0");

	let lock = Lockfile::open(&divider_project.lock_path()).unwrap();
	assert_eq!(lock, compilation.lock);
	assert!(lock.packages["passives"].requested_by.contains("board"));
}

#[test]
fn test_dependency_cycle_is_reported() {
	let ws = Workspace::new("name: board\nentry: main:Board\ndependencies:\n  a: \"^1\"\n");
	ws.publish("a", "1.0.0", &[("b", "^1")], &[]);
	ws.publish("b", "1.0.0", &[("a", "^1")], &[]);
	ws.module("main", json!([]), json!([{"name": "Board", "kind": "module", "body": []}]));

	match ws.compile() {
		Err(CompilerError::PackageError(PackageError::CyclicDependency { cycle })) => {
			assert_eq!(cycle, vec!["a", "b", "a"]);
		},
		other => panic!("expected a dependency cycle, got {:?}", other.err()),
	}
	assert!(!ws.lock_path().exists());
}

#[test]
fn test_interface_connection_merges_every_pin() {
	let ws = Workspace::new("name: board\nentry: main:Board\n");
	ws.module(
		"main",
		json!([]),
		json!([
			{"name": "Power", "kind": "interface", "body": [
				{"stmt": "pin", "name": "vcc"},
				{"stmt": "pin", "name": "gnd"}
			]},
			{"name": "Regulator", "kind": "module", "body": [{"stmt": "new", "name": "out", "class": "Power"}]},
			{"name": "Mcu", "kind": "module", "body": [{"stmt": "new", "name": "supply", "class": "Power"}]},
			{"name": "Board", "kind": "module", "body": [
				{"stmt": "new", "name": "reg", "class": "Regulator"},
				{"stmt": "new", "name": "mcu", "class": "Mcu"},
				{"stmt": "connect", "left": "reg.out", "right": "mcu.supply"}
			]}
		]),
	);

	let compilation = ws.compile().unwrap();
	let design = compilation.outcome.design.unwrap();
	assert_eq!(design.nets().len(), 2);
	assert_eq!(design.connectivity().merges(), 2);
	assert_eq!(design.net_of("reg.out.vcc").unwrap().id, design.net_of("mcu.supply.vcc").unwrap().id);
	assert_eq!(design.net_of("reg.out.gnd").unwrap().id, design.net_of("mcu.supply.gnd").unwrap().id);
	assert_ne!(design.net_of("reg.out.vcc").unwrap().id, design.net_of("reg.out.gnd").unwrap().id);
}

#[test]
fn test_incompatible_roles_are_errors() {
	let ws = Workspace::new("name: board\nentry: main:Board\n");
	ws.module(
		"main",
		json!([]),
		json!([
			{"name": "Driver", "kind": "component", "body": [{"stmt": "pin", "name": "out", "role": "output"}]},
			{"name": "Board", "kind": "module", "body": [
				{"stmt": "new", "name": "U1", "class": "Driver"},
				{"stmt": "new", "name": "U2", "class": "Driver"},
				{"stmt": "connect", "left": "U1.out", "right": "U2.out"}
			]}
		]),
	);

	let compilation = ws.compile().unwrap();
	assert!(compilation.outcome.design.is_none());
	assert!(compilation.outcome.report.has_errors());
	assert!(compilation
		.outcome
		.report
		.messages()
		.iter()
		.any(|m| matches!(m.kind(), ElabMessageKind::IncompatibleConnection { .. })));
}

#[test]
fn test_nearest_override_wins() {
	let ws = Workspace::new("name: board\nentry: main:Board\n");
	ws.module(
		"main",
		json!([]),
		json!([
			resistor(),
			{"name": "Divider", "kind": "module", "body": [
				{"stmt": "new", "name": "R", "class": "Resistor"},
				{"stmt": "assign", "target": "R.resistance", "value": {"expr": "number", "value": 2, "unit": "kΩ"}}
			]},
			{"name": "Board", "kind": "module", "body": [
				{"stmt": "new", "name": "div", "class": "Divider"},
				{"stmt": "new", "name": "R9", "class": "Resistor"},
				{"stmt": "assign", "target": "div.R.resistance", "value": {"expr": "number", "value": 5, "unit": "kΩ"}}
			]}
		]),
	);

	let compilation = ws.compile().unwrap();
	assert!((kilo_ohms(&compilation, "div.R.resistance") - 2.0).abs() < 1e-9);
	assert!((kilo_ohms(&compilation, "R9.resistance") - 1.0).abs() < 1e-9);
}
