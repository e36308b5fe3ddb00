//! Command-line front end: reserialize or dump XML files through the lazy
//! object model.
//!
//! By default the whole document is written back out. With `--first N` only
//! the first N children of the document element are navigated to and
//! written, so the rest of the input is never tokenized; `--stats` reports
//! how many events were read from the input.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};

use xmlaxon::builder::BuilderOptions;
use xmlaxon::event::{CountingSource, SourceStats, XmlEvent, XmlHandler};
use xmlaxon::parser::{ParseOptions, XmlTokenizer};
use xmlaxon::serial::{SerializerOptions, XmlWriter};
use xmlaxon::{Document, ModelError, NodeId, StreamError};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// xmlaxon -- read XML files lazily and write them back out.
#[derive(Parser, Debug)]
#[command(name = "xmlaxon", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// XML files to process (use `-` for stdin).
    #[arg(required = true)]
    files: Vec<String>,

    /// Log builder and serializer transitions to stderr.
    #[arg(long)]
    verbose: bool,

    /// Log every event (implies --verbose).
    #[arg(long)]
    trace: bool,

    // -- Reading options ---------------------------------------------------
    /// Only process the first N children of the document element.
    #[arg(long, value_name = "N")]
    first: Option<usize>,

    /// Report whitespace-only text as ignorable.
    #[arg(long)]
    noblanks: bool,

    /// Keep entity references instead of expanding them.
    #[arg(long)]
    noent: bool,

    /// Create text nodes immediately instead of deferring an element's first
    /// text.
    #[arg(long)]
    no_defer: bool,

    // -- Output options ----------------------------------------------------
    /// Pull unread content straight through instead of building it.
    #[arg(long)]
    no_cache: bool,

    /// Print one line per event instead of XML.
    #[arg(long)]
    dump: bool,

    /// Do not output anything.
    #[arg(long)]
    noout: bool,

    /// Print how many events were read from the input.
    #[arg(long)]
    stats: bool,

    /// Print timing information.
    #[arg(long)]
    timing: bool,
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

const EXIT_SUCCESS: u8 = 0;
const EXIT_READ_ERROR: u8 = 1;
const EXIT_MODEL_ERROR: u8 = 2;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(cli: &Cli) {
    let level = if cli.trace {
        LevelFilter::Trace
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut worst_exit: u8 = EXIT_SUCCESS;

    for file in &cli.files {
        let exit = process_file(&cli, file);
        if exit > worst_exit {
            worst_exit = exit;
        }
    }

    ExitCode::from(worst_exit)
}

/// Processes a single input file and returns an exit code.
fn process_file(cli: &Cli, filename: &str) -> u8 {
    let input = match read_input(filename) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("{filename}: failed to read: {e}");
            return EXIT_READ_ERROR;
        }
    };

    let start = Instant::now();
    let (mut doc, stats) = match open_document(cli, &input) {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("{filename}: {e}");
            return EXIT_READ_ERROR;
        }
    };

    let mut out = String::new();
    let result = if cli.dump {
        let mut dumper = EventDumper::default();
        let r = run(cli, &mut doc, &mut dumper);
        out = dumper.out;
        r
    } else {
        let mut writer = XmlWriter::new().with_declaration(cli.first.is_none());
        let r = run(cli, &mut doc, &mut writer);
        out.push_str(writer.as_str());
        r
    };

    if cli.timing {
        eprintln!("Processing {filename} took {:?}", start.elapsed());
    }
    if cli.stats {
        eprintln!(
            "{filename}: {} events read, source {}",
            stats.pulled(),
            if stats.is_closed() { "closed" } else { "left open" }
        );
    }

    if !cli.noout && !out.is_empty() {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{out}");
    }

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("{filename}: {e}");
            match e {
                ModelError::Stream(_) | ModelError::MalformedInput(_) => EXIT_READ_ERROR,
                _ => EXIT_MODEL_ERROR,
            }
        }
    }
}

fn open_document(cli: &Cli, input: &[u8]) -> Result<(Document, SourceStats), StreamError> {
    let options = ParseOptions::default()
        .ignorable_whitespace(cli.noblanks)
        .expand_entities(!cli.noent);
    let tokenizer = XmlTokenizer::from_bytes(input, &options)?;
    let (source, stats) = CountingSource::new(tokenizer);
    let builder = BuilderOptions::default().defer_text(!cli.no_defer);
    Ok((Document::from_source(source, builder), stats))
}

fn run(cli: &Cli, doc: &mut Document, handler: &mut dyn XmlHandler) -> Result<(), ModelError> {
    let options = SerializerOptions::default().cache(!cli.no_cache);
    let Some(limit) = cli.first else {
        let root = doc.root();
        return doc.pull_serializer(root, options)?.pump_to(handler);
    };
    let Some(element) = doc.document_element(false)? else {
        return Ok(());
    };
    for child in first_children(doc, element, limit)? {
        let mut serializer = doc.pull_serializer(child, options)?;
        serializer.pump_to(handler)?;
    }
    Ok(())
}

fn first_children(doc: &mut Document, parent: NodeId, limit: usize) -> Result<Vec<NodeId>, ModelError> {
    let mut children = Vec::with_capacity(limit);
    let mut next = doc.first_child(parent)?;
    while let Some(child) = next {
        if children.len() == limit {
            break;
        }
        children.push(child);
        // The last wanted child is built so its siblings need not be read.
        if children.len() == limit {
            doc.build(child)?;
            break;
        }
        next = doc.next_sibling(child)?;
    }
    Ok(children)
}

/// Reads input from a file path, or from stdin if the path is `-`.
fn read_input(filename: &str) -> io::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(filename)
    }
}

// ---------------------------------------------------------------------------
// Event dump
// ---------------------------------------------------------------------------

/// Writes one indented line per event.
#[derive(Default)]
struct EventDumper {
    out: String,
    depth: usize,
}

impl XmlHandler for EventDumper {
    fn handle(&mut self, event: XmlEvent) -> Result<(), StreamError> {
        if event.depth_delta() < 0 {
            self.depth = self.depth.saturating_sub(1);
        }
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        let line = match &event {
            XmlEvent::StartElement {
                namespace_uri,
                local_name,
                prefix,
            } => format!("{} {{{namespace_uri}}}{local_name} prefix={prefix:?}", event.kind()),
            XmlEvent::Attribute {
                namespace_uri,
                local_name,
                value,
                ..
            } => format!("{} {{{namespace_uri}}}{local_name}={value:?}", event.kind()),
            XmlEvent::NamespaceDeclaration { prefix, namespace_uri } => {
                format!("{} {prefix:?}={namespace_uri:?}", event.kind())
            }
            XmlEvent::CharacterData { data, ignorable } => {
                format!("{} {:?} ignorable={ignorable}", event.kind(), data.to_text())
            }
            XmlEvent::StartProcessingInstruction { target } => format!("{} {target}", event.kind()),
            XmlEvent::EntityReference { name, .. } => format!("{} {name}", event.kind()),
            _ => event.kind().to_string(),
        };
        self.out.push_str(&line);
        if event.depth_delta() > 0 {
            self.depth += 1;
        }
        Ok(())
    }
}
