extern crate cirklang;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use cirklang::{DiagnosticBuffer, Project, ProvidesCompilerDiagnostic};
use cirn::elab::CancellationToken;
use cirn::ElaboratedDesign;
use clap::{arg, command, value_parser, ArgAction};
use log::info;
use miette::IntoDiagnostic;
use serde::Serialize;

/// Document written for exporters
#[derive(Serialize)]
struct DesignDocument<'a> {
	generated: String,
	project: &'a str,
	version: String,
	design: &'a ElaboratedDesign,
}

fn init_logging(verbose: bool) {
	let level = if verbose { "debug" } else { "warn" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
		.format(|buf, record| {
			writeln!(
				buf,
				"[{} {} {}] {}",
				Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
				record.level(),
				record.target(),
				record.args()
			)
		})
		.init();
}

fn main() -> miette::Result<()> {
	let matches = command!()
		.arg(
			arg!([PROJECT] "Project directory or any path inside it")
				.value_parser(value_parser!(PathBuf))
				.default_value("."),
		)
		.arg(arg!(-e --entry <ENTRY> "Entry point as `module:Name`, overrides `entry` from cirk.yaml"))
		.arg(
			arg!(-o --output <FILE> "Where to write the elaborated design, stdout by default")
				.value_parser(value_parser!(PathBuf)),
		)
		.arg(arg!(--"lock-only" "Resolve dependencies and write the lock file, then stop").action(ArgAction::SetTrue))
		.arg(arg!(-v --verbose "Print debug logs").action(ArgAction::SetTrue))
		.get_matches();

	init_logging(matches.get_flag("verbose"));

	let path = matches.get_one::<PathBuf>("PROJECT").cloned().unwrap_or_else(|| PathBuf::from("."));
	let entry = matches.get_one::<String>("entry").map(String::as_str);

	let project = Project::open(&path).map_err(|e| e.to_miette_report())?;
	let cancel = CancellationToken::new();
	let resolver = project.default_resolver();

	let resolution = project.resolve(&resolver, &cancel).map_err(|e| e.to_miette_report())?;
	project.save_lock(&resolution.lock).map_err(|e| e.to_miette_report())?;
	info!("Lock file written to {}", project.lock_path().display());
	if matches.get_flag("lock-only") {
		return Ok(());
	}

	let registry = project.registry(&resolution).map_err(|e| e.to_miette_report())?;
	let outcome = project
		.elaborate(&registry, entry, &cancel)
		.map_err(|e| e.to_miette_report())?;

	let mut diagnostics = DiagnosticBuffer::new();
	for message in outcome.report.messages() {
		diagnostics.push(message);
	}
	diagnostics.print_diagnostics()?;

	let Some(design) = &outcome.design
	else {
		return Ok(());
	};

	let document = DesignDocument {
		generated: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
		project: &project.config().name,
		version: project.config().version.to_string(),
		design,
	};
	let json = serde_json::to_string_pretty(&document).into_diagnostic()?;

	match matches.get_one::<PathBuf>("output") {
		Some(output) => {
			fs::write(output, json).into_diagnostic()?;
			info!("Design written to {}", output.display());
		},
		None => {
			let mut stdout = io::stdout().lock();
			writeln!(stdout, "{}", json).into_diagnostic()?;
		},
	}
	Ok(())
}
