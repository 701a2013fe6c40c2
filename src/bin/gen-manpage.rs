//! Man page generator for spibus
//!
//! Writes `spibus.1` with an extra BACKENDS section listing the backends
//! compiled into this build and their options.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use clap_mangen::Man;
use std::io::{self, Write};
use std::path::PathBuf;

#[path = "../backends.rs"]
#[allow(dead_code)]
mod backends;
#[path = "../cli.rs"]
#[allow(dead_code)]
mod cli;

/// Escape text for a roff paragraph
fn roff_escape(text: &str) -> String {
    let escaped = text.replace('\\', "\\e").replace('-', "\\-");
    if escaped.starts_with('.') || escaped.starts_with('\'') {
        format!("\\&{}", escaped)
    } else {
        escaped
    }
}

/// Render the BACKENDS section
fn render_backends(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, ".SH BACKENDS")?;
    writeln!(
        out,
        "Select a backend with \\fB\\-p\\fR \\fIname\\fR[:\\fIkey\\fR=\\fIvalue\\fR,...]."
    )?;

    for b in backends::available_backends() {
        writeln!(out, ".TP")?;
        writeln!(out, "\\fB{}\\fR", roff_escape(b.name))?;
        let description: Vec<&str> = b.description.split_whitespace().collect();
        writeln!(out, "{}", roff_escape(&description.join(" ")))?;
        if !b.aliases.is_empty() {
            writeln!(out, ".br")?;
            writeln!(out, "Aliases: {}", roff_escape(&b.aliases.join(", ")))?;
        }
    }

    Ok(())
}

/// Render the complete man page
fn render(out: &mut dyn Write) -> io::Result<()> {
    let man = Man::new(cli::Cli::command());

    man.render_title(out)?;
    man.render_name_section(out)?;
    man.render_synopsis_section(out)?;
    man.render_description_section(out)?;
    man.render_options_section(out)?;
    man.render_subcommands_section(out)?;
    render_backends(out)?;
    man.render_version_section(out)
}

fn main() -> io::Result<()> {
    // Default to ./man directory
    let output_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    std::fs::create_dir_all(&output_dir)?;

    let mut buffer = Vec::new();
    render(&mut buffer)?;

    let output_path = output_dir.join("spibus.1");
    std::fs::write(&output_path, buffer)?;

    println!("Man page generated at: {}", output_path.display());
    println!("  man -l {}", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> String {
        let mut buffer = Vec::new();
        render(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_roff_escape() {
        assert_eq!(roff_escape("linux-spi"), "linux\\-spi");
        assert_eq!(roff_escape(".hidden"), "\\&.hidden");
        assert_eq!(roff_escape("a\\b"), "a\\eb");
    }

    #[test]
    fn test_page_lists_subcommands_and_backends() {
        let page = page();
        assert!(page.contains(".SH BACKENDS"));
        assert!(page.contains(".SH SUBCOMMANDS"));
        for b in backends::available_backends() {
            assert!(page.contains(&format!("\\fB{}\\fR", roff_escape(b.name))));
        }
    }

    #[cfg(feature = "linux-spi")]
    #[test]
    fn test_page_documents_linux_options() {
        let page = page();
        assert!(page.contains("Aliases: linux\\-spi, spidev"));
        assert!(page.contains("cs_gpio=<chip>:<line>"));
    }
}
