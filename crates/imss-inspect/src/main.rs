//! Inspect, verify and convert IMSS streams.
//!
//! Usage:
//!   imss-inspect inspect <file> [--json]
//!   imss-inspect verify <file>
//!   imss-inspect convert <in> <out> --to binary|text [--utf16]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use imss::{
    DecodeStats, Decoded, EncodeOptions, FieldKind, StreamKind, decode_stream, encode_graph_text,
    encode_graph_with_options, format_guid,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stream kind, integrity tag, block counts and declared types
    Inspect {
        file: PathBuf,
        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode the whole stream; exit status 1 if it is invalid
    Verify { file: PathBuf },
    /// Re-encode a stream in the other (or the same) encoding
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum)]
        to: Target,
        /// Write text values as UTF-16 (binary output only)
        #[arg(long)]
        utf16: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    Binary,
    Text,
}

#[derive(Serialize)]
struct Summary {
    file: String,
    size: usize,
    kind: &'static str,
    integrity_tag: String,
    root: String,
    objects: usize,
    blocks: BlockCounts,
    types: Vec<TypeSummary>,
}

#[derive(Serialize)]
struct BlockCounts {
    type_declarations: usize,
    definitions: usize,
    references: usize,
    collections: usize,
    items: usize,
    skipped: usize,
}

impl From<&DecodeStats> for BlockCounts {
    fn from(stats: &DecodeStats) -> Self {
        Self {
            type_declarations: stats.type_declarations,
            definitions: stats.definitions,
            references: stats.references,
            collections: stats.collections,
            items: stats.items,
            skipped: stats.skipped_blocks,
        }
    }
}

#[derive(Serialize)]
struct TypeSummary {
    name: String,
    fields: Vec<FieldSummary>,
}

#[derive(Serialize)]
struct FieldSummary {
    id: u16,
    name: String,
    kind: &'static str,
}

fn kind_name(kind: Option<StreamKind>) -> &'static str {
    match kind {
        Some(StreamKind::Binary) => "binary",
        Some(StreamKind::Text) => "text",
        None => "unknown",
    }
}

fn read_stream(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn summarize(path: &Path, data: &[u8], decoded: &Decoded) -> Summary {
    let root = decoded
        .graph
        .node(decoded.root)
        .map(|node| format_guid(&node.identity))
        .unwrap_or_default();
    let mut types: Vec<TypeSummary> = decoded
        .graph
        .schema()
        .iter()
        .map(|descriptor| TypeSummary {
            name: descriptor.name.clone(),
            fields: descriptor
                .fields
                .iter()
                .map(|field| FieldSummary {
                    id: field.id.0,
                    name: field.name.clone(),
                    kind: field.kind.name(),
                })
                .collect(),
        })
        .collect();
    types.sort_by(|a, b| a.name.cmp(&b.name));

    Summary {
        file: path.display().to_string(),
        size: data.len(),
        kind: kind_name(StreamKind::detect(data)),
        integrity_tag: decoded.stats.integrity_tag.clone(),
        root,
        objects: decoded.graph.len(),
        blocks: BlockCounts::from(&decoded.stats),
        types,
    }
}

fn print_summary(summary: &Summary) {
    println!("Reading: {}", summary.file);
    println!("File size: {} bytes", summary.size);
    println!("Encoding: {}", summary.kind);
    println!("Integrity tag: {}", summary.integrity_tag);
    println!("Root: {}", summary.root);
    println!("Objects: {}", summary.objects);

    let blocks = &summary.blocks;
    println!("\n=== Blocks ===");
    println!("  Type declarations: {}", blocks.type_declarations);
    println!("  Definitions:       {}", blocks.definitions);
    println!("  References:        {}", blocks.references);
    println!("  Collections:       {}", blocks.collections);
    println!("  Items:             {}", blocks.items);
    if blocks.skipped > 0 {
        println!("  Skipped (unknown): {}", blocks.skipped);
    }

    println!("\n=== Types ({}) ===", summary.types.len());
    for ty in &summary.types {
        println!("  {} ({} fields)", ty.name, ty.fields.len());
        for field in &ty.fields {
            let marker = match FieldKind::from_name(field.kind) {
                Some(kind) if kind.is_structural() => " *",
                _ => "",
            };
            println!("    {:>3} {}: {}{}", field.id, field.name, field.kind, marker);
        }
    }
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let data = read_stream(path)?;
    let decoded =
        decode_stream(&data).with_context(|| format!("failed to decode {}", path.display()))?;
    let summary = summarize(path, &data, &decoded);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn verify(path: &Path) -> Result<bool> {
    let data = read_stream(path)?;
    let (ok, line) = verdict(path, &data);
    println!("{line}");
    Ok(ok)
}

/// Decodes `data` and renders the one-line verification result.
fn verdict(path: &Path, data: &[u8]) -> (bool, String) {
    match decode_stream(data) {
        Ok(decoded) => (
            true,
            format!(
                "OK {} ({} objects, tag {})",
                path.display(),
                decoded.graph.len(),
                decoded.stats.integrity_tag
            ),
        ),
        Err(e) => {
            tracing::debug!(error = ?e, "verification failed");
            (false, format!("FAIL {} [{}] {}", path.display(), e.kind().code(), e))
        }
    }
}

fn convert(input: &Path, output: &Path, to: Target, utf16: bool) -> Result<()> {
    let data = read_stream(input)?;
    let decoded =
        decode_stream(&data).with_context(|| format!("failed to decode {}", input.display()))?;

    let bytes = match to {
        Target::Binary => {
            let options = if utf16 {
                EncodeOptions::utf16()
            } else {
                EncodeOptions::new()
            };
            encode_graph_with_options(&decoded.graph, decoded.root, options)?
        }
        Target::Text => {
            if utf16 {
                tracing::warn!("--utf16 has no effect on text output");
            }
            encode_graph_text(&decoded.graph, decoded.root)?
        }
    };

    fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        from = data.len(),
        to = bytes.len(),
        "converted"
    );
    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Inspect { file, json } => inspect(&file, json)?,
        Command::Verify { file } => {
            if !verify(&file)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Convert {
            input,
            output,
            to,
            utf16,
        } => convert(&input, &output, to, utf16)?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imss::{FieldKind, Graph, TypeDescriptor, Value, decode_graph, encode_graph, new_identity};
    use tempfile::tempdir;

    /// Two people who name each other as friend.
    fn friends() -> (Vec<u8>, imss::Guid) {
        let mut graph = Graph::new();
        graph.register_type(
            TypeDescriptor::new("Person")
                .field(1, "Name", FieldKind::Text)
                .field(2, "Friend", FieldKind::Object),
        );
        let alice_id = new_identity();
        let alice = graph.add_object(alice_id, "Person");
        let bob = graph.add_object(new_identity(), "Person");
        graph.set(alice, "Name", Value::text("Alice"));
        graph.set(alice, "Friend", Value::object(bob));
        graph.set(bob, "Name", Value::text("Bob"));
        graph.set(bob, "Friend", Value::object(alice));
        (encode_graph(&graph, alice).unwrap(), alice_id)
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::parse_from(["imss-inspect", "-v", "inspect", "a.imss", "--json"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Inspect { json: true, .. }));

        let cli = Cli::parse_from(["imss-inspect", "convert", "a", "b", "--to", "text"]);
        assert!(matches!(
            cli.command,
            Command::Convert { to: Target::Text, utf16: false, .. }
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_target() {
        assert!(Cli::try_parse_from(["imss-inspect", "convert", "a", "b", "--to", "xml"]).is_err());
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(kind_name(StreamKind::detect(b"IMSS0100TXT\n")), "text");
        assert_eq!(kind_name(StreamKind::detect(b"IMSS0100BIN")), "binary");
        assert_eq!(kind_name(StreamKind::detect(b"nope")), "unknown");
    }

    #[test]
    fn test_verify_accepts_valid_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("friends.imss");
        fs::write(&path, friends().0).unwrap();

        assert!(verify(&path).unwrap());
        let (ok, line) = verdict(&path, &fs::read(&path).unwrap());
        assert!(ok);
        assert!(line.starts_with("OK "), "{line}");
        assert!(line.contains("2 objects"), "{line}");
    }

    #[test]
    fn test_verify_reports_error_code_on_corrupt_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.imss");
        let mut bytes = friends().0;
        bytes[14] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert!(!verify(&path).unwrap());
        let (ok, line) = verdict(&path, &bytes);
        assert!(!ok);
        assert!(line.starts_with("FAIL "), "{line}");
        assert!(line.contains("[FORMAT]"), "{line}");
    }

    #[test]
    fn test_verify_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(verify(&dir.path().join("absent.imss")).is_err());
    }

    #[test]
    fn test_convert_binary_text_binary() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("friends.imss");
        let text = dir.path().join("friends.txt");
        let back = dir.path().join("back.imss");
        let (bytes, alice_id) = friends();
        fs::write(&binary, bytes).unwrap();

        convert(&binary, &text, Target::Text, false).unwrap();
        let rendered = fs::read(&text).unwrap();
        assert!(rendered.starts_with(b"IMSS0100TXT\n"));

        convert(&text, &back, Target::Binary, true).unwrap();
        let decoded = decode_graph(&fs::read(&back).unwrap()).unwrap();
        let root = decoded.root;
        assert_eq!(decoded.graph.node(root).unwrap().identity, alice_id);
        assert_eq!(decoded.graph.get(root, "Name"), Some(&Value::text("Alice")));
        let bob = decoded.graph.get(root, "Friend").and_then(Value::as_object).unwrap();
        assert_eq!(decoded.graph.get(bob, "Name"), Some(&Value::text("Bob")));
        assert_eq!(
            decoded.graph.get(bob, "Friend").and_then(Value::as_object),
            Some(root)
        );
    }

    #[test]
    fn test_convert_rejects_corrupt_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bad.imss");
        let output = dir.path().join("out.txt");
        fs::write(&input, b"IMSS0100BIN").unwrap();

        assert!(convert(&input, &output, Target::Text, false).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_summarize_json_fields() {
        let (bytes, alice_id) = friends();
        let decoded = decode_stream(&bytes).unwrap();
        let summary = summarize(Path::new("friends.imss"), &bytes, &decoded);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["kind"], "binary");
        assert_eq!(json["size"], bytes.len());
        assert_eq!(json["root"], format_guid(&alice_id));
        assert_eq!(json["objects"], 2);
        assert_eq!(json["integrity_tag"], decoded.stats.integrity_tag.as_str());
        assert_eq!(json["blocks"]["type_declarations"], 1);
        assert_eq!(json["blocks"]["definitions"], 2);
        assert_eq!(json["blocks"]["references"], 1);
        assert_eq!(json["types"][0]["name"], "Person");
        assert_eq!(json["types"][0]["fields"][1]["kind"], "object");
    }
}
