//! Output formatting

use miette::{GraphicalReportHandler, GraphicalTheme, NamedSource, Report};
use sqlsema_core::{Diagnostic, Severity};

use crate::args::OutputFormat;

/// Output formatter for diagnostics of one file
pub struct OutputFormatter {
    format: OutputFormat,
    file_name: String,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, file_name: String) -> Self {
        Self { format, file_name }
    }

    /// Print diagnostics in the configured format
    pub fn print_diagnostics(&self, diagnostics: &[Diagnostic], source: &str) {
        match self.format {
            OutputFormat::Human => self.print_human(diagnostics, source),
            OutputFormat::Json => println!("{}", self.json(diagnostics)),
            OutputFormat::Sarif => println!("{}", self.sarif(diagnostics, source)),
        }
    }

    fn print_human(&self, diagnostics: &[Diagnostic], source: &str) {
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode());
        for diag in diagnostics {
            let report = Report::new(diag.clone())
                .with_source_code(NamedSource::new(&self.file_name, source.to_string()));
            let mut rendered = String::new();
            if handler.render_report(&mut rendered, report.as_ref()).is_err() {
                rendered = format!("{}[{}]: {}", severity_name(diag.severity), diag.code(), diag.message);
            }
            eprintln!("{}", rendered);
        }
    }

    fn json(&self, diagnostics: &[Diagnostic]) -> String {
        let output = serde_json::json!({
            "file": self.file_name,
            "diagnostics": diagnostics
        });
        serde_json::to_string_pretty(&output).unwrap_or_default()
    }

    fn sarif(&self, diagnostics: &[Diagnostic], source: &str) -> String {
        let results: Vec<serde_json::Value> = diagnostics
            .iter()
            .map(|d| {
                let mut location = serde_json::json!({
                    "physicalLocation": {
                        "artifactLocation": {
                            "uri": self.file_name
                        }
                    }
                });
                if let Some(span) = &d.span {
                    let (line, col) = if span.line > 0 {
                        (span.line, span.column)
                    } else {
                        offset_to_line_col(source, span.offset)
                    };
                    location["physicalLocation"]["region"] = serde_json::json!({
                        "startLine": line,
                        "startColumn": col,
                    });
                }
                serde_json::json!({
                    "ruleId": d.code(),
                    "level": match d.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                        Severity::Info => "note",
                    },
                    "message": {
                        "text": d.message
                    },
                    "locations": [location],
                    "properties": {
                        "sqlstate": d.kind.sqlstate()
                    }
                })
            })
            .collect();

        let sarif = serde_json::json!({
            "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
            "version": "2.1.0",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": "sqlsema",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                },
                "results": results
            }]
        });

        serde_json::to_string_pretty(&sarif).unwrap_or_default()
    }
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

/// Convert byte offset to line and column (1-indexed)
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}
