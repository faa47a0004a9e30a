//! Line-delimited JSON event protocol on stdout.

use presence_core::Person;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
}

/// One record of the output protocol, serialized as `{"<type>": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Status(String),
    Login { names: Vec<String> },
    Logout { names: Vec<String> },
    Emotion { person: Person },
}

impl Event {
    pub fn status(message: impl Into<String>) -> Self {
        Event::Status(message.into())
    }
}

/// Writes each event as one line and flushes before returning.
pub struct EventEmitter<W: Write> {
    out: W,
    emitted: u64,
}

impl EventEmitter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> EventEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out, emitted: 0 }
    }

    pub fn emit(&mut self, event: &Event) -> Result<(), EmitError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()?;
        self.emitted += 1;
        tracing::debug!(?event, "emitted event");
        Ok(())
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::Emotion;

    fn emit_all(events: &[Event]) -> String {
        let mut emitter = EventEmitter::new(Vec::new());
        for e in events {
            emitter.emit(e).unwrap();
        }
        assert_eq!(emitter.emitted(), events.len() as u64);
        String::from_utf8(emitter.into_inner()).unwrap()
    }

    #[test]
    fn test_wire_shapes() {
        let out = emit_all(&[
            Event::status("starting video stream..."),
            Event::Login {
                names: vec!["alice".into(), "unknown".into()],
            },
            Event::Logout {
                names: vec!["bob".into()],
            },
            Event::Emotion {
                person: Person {
                    name: "alice".into(),
                    emotion: Emotion::Happy,
                },
            },
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"status":"starting video stream..."}"#,
                r#"{"login":{"names":["alice","unknown"]}}"#,
                r#"{"logout":{"names":["bob"]}}"#,
                r#"{"emotion":{"person":{"name":"alice","emotion":"happy"}}}"#,
            ]
        );
    }

    #[test]
    fn test_each_event_is_flushed_line() {
        struct Recorder {
            writes: Vec<u8>,
            flushes: usize,
        }
        impl Write for Recorder {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.writes.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.flushes += 1;
                Ok(())
            }
        }

        let mut emitter = EventEmitter::new(Recorder {
            writes: Vec::new(),
            flushes: 0,
        });
        emitter.emit(&Event::status("a")).unwrap();
        emitter.emit(&Event::status("b")).unwrap();
        let rec = emitter.into_inner();
        assert_eq!(rec.flushes, 2);
        assert_eq!(rec.writes, b"{\"status\":\"a\"}\n{\"status\":\"b\"}\n");
    }

    #[test]
    fn test_write_failure_is_reported() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut emitter = EventEmitter::new(Closed);
        assert!(matches!(emitter.emit(&Event::status("x")), Err(EmitError::Io(_))));
        assert_eq!(emitter.emitted(), 0);
    }
}
