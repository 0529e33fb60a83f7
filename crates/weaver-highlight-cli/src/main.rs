use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use weaver_highlight::selection::{self, CanonicalDocument};
use weaver_highlight::{
    HighlightConfig, HighlightRange, NodePath, PathSelection, RenderCache, Segment, canonical,
    segment, text,
};

#[derive(Parser)]
#[command(version, about = "Weaver highlights - inspect canonical text, segments and rendering", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON highlight config
    #[arg(long, global = true, env = "WEAVER_HIGHLIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical text of a markup fragment
    Canonicalize {
        /// Markup fragment file
        markup: PathBuf,

        /// Print the text-node mapping as JSON instead of the text
        #[arg(long)]
        mapping: bool,
    },
    /// Flatten highlight ranges into disjoint segments
    Segment {
        /// JSON array of highlight ranges
        #[arg(long)]
        ranges: PathBuf,

        /// Text length in codepoints
        #[arg(long, conflicts_with = "markup", required_unless_present = "markup")]
        length: Option<usize>,

        /// Take the text length from this markup fragment's canonical text
        #[arg(long)]
        markup: Option<PathBuf>,
    },
    /// Render highlight markers into one or more markup fragments
    Render {
        /// Markup fragment files. Repeated paths are served from the render cache.
        #[arg(required = true)]
        markup: Vec<PathBuf>,

        /// JSON array of highlight ranges
        #[arg(long)]
        ranges: PathBuf,

        /// Stored canonical text to validate against (defaults to rebuilding it).
        /// Only valid with a single fragment.
        #[arg(long)]
        canonical: Option<PathBuf>,
    },
    /// Convert a selection, given as tree paths, into canonical offsets
    Locate {
        /// Markup fragment file
        markup: PathBuf,

        /// Anchor as dotted child path and offset, e.g. `0.1.0:3`
        #[arg(long)]
        anchor: String,

        /// Focus as dotted child path and offset
        #[arg(long)]
        focus: String,

        /// Stored canonical text to validate against (defaults to rebuilding it)
        #[arg(long)]
        canonical: Option<PathBuf>,

        /// JSON array of existing ranges to check for duplicates
        #[arg(long)]
        ranges: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_miette();
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => HighlightConfig::from_json(&read(path)?)?,
        None => HighlightConfig::default(),
    };

    match cli.command {
        Commands::Canonicalize { markup, mapping } => canonicalize(&markup, mapping),
        Commands::Segment {
            ranges,
            length,
            markup,
        } => segment_ranges(&ranges, length, markup.as_deref()),
        Commands::Render {
            markup,
            ranges,
            canonical,
        } => render_markup(&config, &markup, &ranges, canonical.as_deref()),
        Commands::Locate {
            markup,
            anchor,
            focus,
            canonical,
            ranges,
        } => locate(
            &config,
            &markup,
            &anchor,
            &focus,
            canonical.as_deref(),
            ranges.as_deref(),
        ),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn read_ranges(path: &Path) -> Result<Vec<HighlightRange>> {
    serde_json::from_str(&read(path)?)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a JSON array of ranges", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{out}");
    Ok(())
}

#[derive(Serialize)]
struct MappingRow {
    start: usize,
    end: usize,
    in_code: bool,
    path: Option<NodePath>,
    text: String,
}

fn canonicalize(markup: &Path, mapping: bool) -> Result<()> {
    let (html, built) = canonical::build_from_markup(&read(markup)?);
    tracing::info!(length = built.length, nodes = built.mapping.len(), "built canonical text");

    if !mapping {
        println!("{}", built.text);
        return Ok(());
    }
    let rows: Vec<MappingRow> = built
        .mapping
        .iter()
        .map(|entry| MappingRow {
            start: entry.start,
            end: entry.end,
            in_code: entry.in_code,
            path: weaver_highlight::tree::path_of(&html, entry.node),
            text: text::slice_codepoints(&built.text, entry.start, entry.end).to_string(),
        })
        .collect();
    print_json(&rows)
}

#[derive(Serialize)]
struct SegmentReport<'a> {
    length: usize,
    segments: &'a [Segment],
    dropped: Vec<DroppedRow>,
}

#[derive(Serialize)]
struct DroppedRow {
    id: String,
    reason: String,
}

fn segment_ranges(ranges: &Path, length: Option<usize>, markup: Option<&Path>) -> Result<()> {
    let ranges = read_ranges(ranges)?;
    let length = match (length, markup) {
        (Some(length), _) => length,
        (None, Some(markup)) => canonical::build_from_markup(&read(markup)?).1.length,
        (None, None) => miette::bail!("either --length or --markup is required"),
    };

    let result = segment(length, &ranges);
    print_json(&SegmentReport {
        length,
        segments: &result.segments,
        dropped: result
            .dropped
            .iter()
            .map(|d| DroppedRow {
                id: d.id.to_string(),
                reason: d.reason.to_string(),
            })
            .collect(),
    })
}

fn stored_canonical(markup: &str, stored_path: Option<&Path>) -> Result<String> {
    match stored_path {
        Some(path) => read(path),
        None => Ok(canonical::build_from_markup(markup).1.text),
    }
}

fn render_markup(
    config: &HighlightConfig,
    markup: &[PathBuf],
    ranges: &Path,
    canonical: Option<&Path>,
) -> Result<()> {
    if canonical.is_some() && markup.len() > 1 {
        miette::bail!("--canonical can only be used with a single markup file");
    }
    let ranges = read_ranges(ranges)?;
    let mut cache = RenderCache::from_config(config);

    for path in markup {
        let source = read(path)?;
        let stored = stored_canonical(&source, canonical)?;
        let document_id = path.display().to_string();

        let out = cache.get_or_render(&document_id, &source, &stored, &ranges);
        if !out.validation_passed {
            miette::bail!(
                help = "the markup no longer produces the stored canonical text",
                "canonical text mismatch in {}; no highlights rendered",
                document_id
            );
        }
        tracing::info!(
            document = %document_id,
            ranges = ranges.len(),
            failed = out.failed_ids.len(),
            "rendered highlights"
        );
        println!("{}", out.markup);
    }

    let stats = cache.stats();
    tracing::debug!(
        hits = stats.hits,
        misses = stats.misses,
        size = stats.size,
        "render cache"
    );
    Ok(())
}

/// Parse `0.1.0:3` into a child path and offset. An empty path (`:2`)
/// addresses the content root.
fn parse_point(point: &str) -> Result<(NodePath, usize)> {
    let (path, offset) = point
        .rsplit_once(':')
        .ok_or_else(|| miette::miette!("expected PATH:OFFSET, got `{point}`"))?;
    let offset = offset
        .parse::<usize>()
        .into_diagnostic()
        .wrap_err_with(|| format!("bad offset in `{point}`"))?;
    let path = if path.is_empty() {
        Vec::new()
    } else {
        path.split('.')
            .map(|part| part.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .into_diagnostic()
            .wrap_err_with(|| format!("bad path in `{point}`"))?
    };
    Ok((path, offset))
}

#[derive(Serialize)]
struct LocateReport {
    start: usize,
    end: usize,
    text: String,
    duplicate_of: Option<String>,
}

fn locate(
    config: &HighlightConfig,
    markup: &Path,
    anchor: &str,
    focus: &str,
    canonical: Option<&Path>,
    ranges: Option<&Path>,
) -> Result<()> {
    let markup = read(markup)?;
    let stored = stored_canonical(&markup, canonical)?;
    let document = CanonicalDocument::parse(&markup);

    let (anchor_path, anchor_offset) = parse_point(anchor)?;
    let (focus_path, focus_offset) = parse_point(focus)?;
    let paths = PathSelection {
        anchor_path,
        anchor_offset,
        focus_path,
        focus_offset,
    };
    let tree_selection = paths
        .resolve(document.html())
        .ok_or_else(|| miette::miette!("selection path does not exist in the markup"))?;

    let mismatch = !document.matches(&stored);
    let found = selection::convert(
        &tree_selection,
        &document,
        &stored,
        mismatch,
        config.selection_limits(),
    )?;

    let duplicate_of = match ranges {
        Some(path) => selection::find_duplicate(&read_ranges(path)?, found.start, found.end)
            .map(|id| id.to_string()),
        None => None,
    };
    print_json(&LocateReport {
        start: found.start,
        end: found.end,
        text: found.text,
        duplicate_of,
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn init_miette() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("0.1.0:3").unwrap(), (vec![0, 1, 0], 3));
        assert_eq!(parse_point(":2").unwrap(), (vec![], 2));
        assert!(parse_point("0.1").is_err());
        assert!(parse_point("0.x:1").is_err());
    }

    #[test]
    fn test_cli_parses_locate() {
        let cli = Cli::try_parse_from([
            "weaver-highlight",
            "locate",
            "doc.html",
            "--anchor",
            "0.0:1",
            "--focus",
            "0.0:4",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Locate { .. }));
    }

    #[test]
    fn test_cli_parses_render_with_several_fragments() {
        let cli = Cli::try_parse_from([
            "weaver-highlight",
            "render",
            "a.html",
            "b.html",
            "--ranges",
            "r.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { markup, .. } => assert_eq!(markup.len(), 2),
            _ => panic!("expected render"),
        }
        assert!(Cli::try_parse_from(["weaver-highlight", "render", "--ranges", "r.json"]).is_err());
    }

    #[test]
    fn test_segment_requires_length_or_markup() {
        assert!(Cli::try_parse_from(["weaver-highlight", "segment", "--ranges", "r.json"]).is_err());
    }
}
