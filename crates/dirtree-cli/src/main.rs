use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dirtree_core::{
	CancelFlag, DirectoryBackend, DirectoryWalker, ExportOutcome, HostBackend, LineCommandSource, ListingSink, LocalPathBuilder,
	Ruleset, WalkContext, WalkOptions, WriterSink,
};
use indicatif::ProgressBar;

#[derive(Parser, Debug)]
#[command(name = "dirtree", version, about = "Walk, browse and export directory trees of recovered volumes")]
struct Cli {
	/// Log every visited inode (-v), debug output (-vv)
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbose: u8,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Write a listing of every reachable directory
	Dump {
		/// Root of the extracted volume
		root: PathBuf,
		/// Write the listing to this file instead of stdout
		#[arg(long)]
		log: Option<PathBuf>,
		/// Prefix each entry with its directory path
		#[arg(long)]
		full_path: bool,
		/// Include entries flagged as deleted
		#[arg(long)]
		deleted: bool,
	},
	/// Navigate the tree interactively and copy files out
	Browse {
		/// Root of the extracted volume
		root: PathBuf,
		/// Destination for copies; asked on first copy when absent
		#[arg(long)]
		out: Option<PathBuf>,
		/// Naming rules applied to names the destination refuses
		#[arg(long, default_value_t = Ruleset::native())]
		ruleset: Ruleset,
	},
	/// Copy the whole tree to a local directory
	Export {
		/// Root of the extracted volume
		root: PathBuf,
		#[arg(long)]
		out: PathBuf,
		/// Naming rules applied to names the destination refuses
		#[arg(long, default_value_t = Ruleset::native())]
		ruleset: Ruleset,
		/// Print the export report as JSON
		#[arg(long)]
		json: bool,
	},
}

fn init_logging(verbose: u8) {
	let level = match verbose {
		0 => tracing::Level::WARN,
		1 => tracing::Level::INFO,
		_ => tracing::Level::DEBUG,
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(io::stderr)
		.init();
}

/// Turn Ctrl-C into a walk cancellation so the listing is flushed
#[cfg(unix)]
fn cancel_on_interrupt(flag: &CancelFlag) -> Result<()> {
	signal_hook::flag::register(signal_hook::consts::SIGINT, flag.handle())
		.context("cannot install the interrupt handler")?;
	Ok(())
}

#[cfg(not(unix))]
fn cancel_on_interrupt(_flag: &CancelFlag) -> Result<()> {
	Ok(())
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	match cli.command {
		Commands::Dump { root, log, full_path, deleted } => {
			let backend = HostBackend::open(&root)?;
			let sink: Box<dyn ListingSink> = match &log {
				Some(path) => {
					let file = File::create(path)
						.with_context(|| format!("cannot create log file {}", path.display()))?;
					Box::new(WriterSink::new(BufWriter::new(file)))
				}
				None => Box::new(WriterSink::new(io::stdout())),
			};
			let options = WalkOptions::default()
				.with_full_path(full_path)
				.with_deleted(deleted)
				.with_verbosity(cli.verbose);

			let cancel = CancelFlag::new();
			cancel_on_interrupt(&cancel)?;

			let ctx = WalkContext::new(backend)
				.with_options(options)
				.with_sink(sink)
				.with_cancel_flag(cancel);
			let mut walker = DirectoryWalker::new(ctx);
			let stats = walker.dump_root()?;

			eprintln!("✅ Listed {} directories, {} entries", stats.directories_visited, stats.entries_listed);
			if stats.damaged_directories > 0 || stats.loops_avoided > 0 {
				eprintln!(
					"⚠️  {} damaged directories, {} loops avoided",
					stats.damaged_directories, stats.loops_avoided
				);
			}
			if let Some(path) = log {
				eprintln!("📝 Listing written to {}", path.display());
			}
		}
		Commands::Browse { root, out, ruleset } => {
			let backend = HostBackend::open(&root)?;
			let mut ctx = WalkContext::new(backend)
				.with_options(WalkOptions::default().with_verbosity(cli.verbose))
				.with_sink(Box::new(WriterSink::new(io::sink())));
			if let Some(out) = out {
				ctx.set_destination(LocalPathBuilder::new(out).with_ruleset(ruleset));
			}

			let mut walker = DirectoryWalker::new(ctx);
			let root_inode = walker.context().backend().root_inode();
			let mut source = LineCommandSource::new(io::stdin().lock(), io::stdout());
			walker.browse(root_inode, &mut source)?;
		}
		Commands::Export { root, out, ruleset, json } => {
			let backend = HostBackend::open(&root)?;
			let ctx = WalkContext::new(backend)
				.with_options(WalkOptions::default().with_verbosity(cli.verbose))
				.with_sink(Box::new(WriterSink::new(io::sink())));
			let mut walker = DirectoryWalker::new(ctx);

			let pb = ProgressBar::new_spinner();
			pb.enable_steady_tick(Duration::from_millis(100));
			pb.set_message(format!("Exporting {} to {}", root.display(), out.display()));
			let report = walker.export_root(LocalPathBuilder::new(&out).with_ruleset(ruleset));
			pb.finish_and_clear();

			if json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			} else {
				println!("📁 Export {}", report.outcome);
				println!("📈 Files copied: {}", report.files_copied);
				println!("❌ Files failed: {}", report.files_failed);
				println!("📂 Directories created: {}", report.directories_created);
				if report.subtrees_truncated > 0 {
					println!("⚠️  Subtrees skipped: {}", report.subtrees_truncated);
				}
			}
			if report.outcome == ExportOutcome::Failed {
				bail!("export of {} failed", root.display());
			}
		}
	}
	Ok(())
}
