//! JUnit XML, as written by surefire, pytest, gtest and most other runners.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::core::errors::ReportError;
use crate::reports::{ParsedReport, ReportCase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Problem {
    Failure,
    Error,
}

#[derive(Debug)]
struct PendingCase {
    name: String,
    time_seconds: f64,
    failure: Option<String>,
    error: Option<String>,
}

impl PendingCase {
    fn from_start(e: &BytesStart) -> Result<Self, String> {
        Ok(PendingCase {
            name: attribute(e, "name")?.unwrap_or_else(|| "unknown".to_string()),
            time_seconds: attribute(e, "time")?
                .and_then(|time| time.trim().parse().ok())
                .unwrap_or(0.0),
            failure: None,
            error: None,
        })
    }

    fn record(&mut self, problem: Problem, message: String) {
        let slot = match problem {
            Problem::Failure => &mut self.failure,
            Problem::Error => &mut self.error,
        };
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    /// A `<failure>` wins over an `<error>` on the same case.
    fn finish(self) -> ReportCase {
        let (passed, errored, message) = match (self.failure, self.error) {
            (Some(message), _) => (false, false, Some(message)),
            (None, Some(message)) => (false, true, Some(message)),
            (None, None) => (true, false, None),
        };
        ReportCase {
            name: self.name,
            passed,
            errored,
            time_seconds: self.time_seconds,
            message: message.filter(|message| !message.is_empty()),
        }
    }
}

pub fn parse_file(path: &Path) -> Result<ParsedReport, ReportError> {
    let xml = fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&xml).map_err(|msg| ReportError::Malformed {
        path: path.to_path_buf(),
        msg,
    })
}

/// Accepts `<testsuites>` or a bare `<testsuite>` root; any other root
/// yields an empty report.
pub fn parse_str(xml: &str) -> Result<ParsedReport, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report = ParsedReport::default();
    let mut seen_root = false;
    let mut case: Option<PendingCase> = None;
    // Problem element whose text body is the message, with the text so far.
    let mut capture: Option<(Problem, String)> = None;

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                if !seen_root {
                    seen_root = true;
                    if !matches!(e.local_name().as_ref(), b"testsuites" | b"testsuite") {
                        return Ok(report);
                    }
                    continue;
                }

                match e.local_name().as_ref() {
                    b"testcase" if case.is_none() => {
                        let pending = PendingCase::from_start(e)?;
                        if is_empty {
                            report.cases.push(pending.finish());
                        } else {
                            case = Some(pending);
                        }
                    }
                    name @ (b"failure" | b"error") => {
                        let Some(pending) = case.as_mut() else {
                            continue;
                        };
                        let problem = if name == b"failure" {
                            Problem::Failure
                        } else {
                            Problem::Error
                        };
                        match attribute(e, "message")? {
                            Some(message) => pending.record(problem, message),
                            None if is_empty => pending.record(problem, String::new()),
                            None => capture = Some((problem, String::new())),
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&e.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"failure" | b"error" => {
                    if let (Some((problem, text)), Some(pending)) = (capture.take(), case.as_mut())
                    {
                        pending.record(problem, text.trim().to_string());
                    }
                }
                b"testcase" => {
                    if let Some(pending) = case.take() {
                        report.cases.push(pending.finish());
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(report)
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, String> {
    match e.try_get_attribute(name).map_err(|e| e.to_string())? {
        Some(attr) => Ok(Some(
            attr.unescape_value()
                .map_err(|e| e.to_string())?
                .into_owned(),
        )),
        None => Ok(None),
    }
}
