use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Where a block of received bytes came from.
#[derive(Clone, Copy, Debug)]
pub struct Origin<'a> {
    pub master: &'a str,
    pub eid: Option<&'a str>,
    pub codec: &'a str,
}

#[derive(Serialize)]
struct ReceivedOutput<'a> {
    master: &'a str,
    eid: Option<&'a str>,
    codec: &'a str,
    size: usize,
    text: Option<String>,
    hex: String,
    timestamp: String,
}

pub fn print_received(data: &[u8], origin: Origin<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReceivedOutput {
                master: origin.master,
                eid: origin.eid,
                codec: origin.codec,
                size: data.len(),
                text: text_of(data),
                hex: hex::encode_upper(data),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EID", "CODEC", "SIZE", "DATA"])
                .add_row(vec![
                    origin.eid.unwrap_or("-").to_string(),
                    origin.codec.to_string(),
                    data.len().to_string(),
                    preview(data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "eid={} codec={} size={} data={}",
                origin.eid.unwrap_or("-"),
                origin.codec,
                data.len(),
                preview(data)
            );
        }
        OutputFormat::Raw => print_raw(data),
    }
}

/// Outcome of a `link` run.
#[derive(Serialize)]
pub struct LinkReport<'a> {
    pub master: &'a str,
    pub eid: Option<&'a str>,
    pub codec: &'a str,
    pub mode: &'a str,
    pub linked: bool,
    pub kept: bool,
    pub elapsed_ms: u128,
}

pub fn print_link_report(report: &LinkReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            table.add_row(vec!["master", report.master]);
            table.add_row(vec!["eid", report.eid.unwrap_or("-")]);
            table.add_row(vec!["codec", report.codec]);
            table.add_row(vec!["mode", report.mode]);
            table.add_row(vec!["linked".to_string(), report.linked.to_string()]);
            table.add_row(vec!["kept".to_string(), report.kept.to_string()]);
            table.add_row(vec![
                "elapsed".to_string(),
                format!("{} ms", report.elapsed_ms),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "master={} eid={} codec={} mode={} linked={} kept={} elapsed={}ms",
                report.master,
                report.eid.unwrap_or("-"),
                report.codec,
                report.mode,
                report.linked,
                report.kept,
                report.elapsed_ms
            );
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    listening: &'a str,
}

pub fn print_listening(addr: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput { listening: addr }),
        _ => println!("listening on {addr}"),
    }
    let _ = std::io::stdout().flush();
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn text_of(data: &[u8]) -> Option<String> {
    std::str::from_utf8(data)
        .ok()
        .map(|text| text.trim_end_matches('\r').to_string())
}

fn preview(data: &[u8]) -> String {
    match text_of(data) {
        Some(text) => text,
        None => format!("<binary {} bytes: {}>", data.len(), hex::encode_upper(data)),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
