//! Manual authorization on the operator's terminal.
//!
//! Asks for the person's roll number. A roll number on the roster authorizes
//! that person; an unknown one asks for a name so the person can be
//! registered after their attendance is recorded.

use presence_core::{AuthorizationGate, AuthorizationOutcome, Identity, Observation, RosterProvider};
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

pub struct ConsoleGate<R> {
    roster: Arc<R>,
    tty_path: PathBuf,
}

impl<R: RosterProvider> ConsoleGate<R> {
    pub fn new(roster: Arc<R>, tty_path: PathBuf) -> Self {
        Self { roster, tty_path }
    }
}

impl<R: RosterProvider> AuthorizationGate for ConsoleGate<R> {
    fn authorize(&mut self, observation: &Observation) -> AuthorizationOutcome {
        let tty = match OpenOptions::new().read(true).write(true).open(&self.tty_path) {
            Ok(tty) => tty,
            Err(e) => {
                tracing::warn!(path = %self.tty_path.display(), error = %e, "no terminal for manual authorization");
                return AuthorizationOutcome::Failed;
            }
        };
        let output = match tty.try_clone() {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "cannot write to terminal");
                return AuthorizationOutcome::Failed;
            }
        };

        match prompt(self.roster.as_ref(), BufReader::new(tty), output, observation) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "manual authorization prompt failed");
                AuthorizationOutcome::Failed
            }
        }
    }
}

fn read_answer<I: BufRead>(input: &mut I) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

/// Run the roll-number dialogue. A blank answer or end of input fails.
pub fn prompt<R, I, O>(
    roster: &R,
    mut input: I,
    mut output: O,
    observation: &Observation,
) -> io::Result<AuthorizationOutcome>
where
    R: RosterProvider + ?Sized,
    I: BufRead,
    O: Write,
{
    write!(
        output,
        "Face on track {} not recognized. Roll number (blank to cancel): ",
        observation.track_id
    )?;
    output.flush()?;

    let Some(answer) = read_answer(&mut input)? else {
        return Ok(AuthorizationOutcome::Failed);
    };
    let Ok(roll_number) = answer.parse::<i64>() else {
        writeln!(output, "'{answer}' is not a roll number.")?;
        return Ok(AuthorizationOutcome::Failed);
    };

    let known = roster
        .find(roll_number)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    if let Some(identity) = known {
        return Ok(AuthorizationOutcome::Authorized {
            identity,
            roll_number,
        });
    }

    write!(output, "Roll number {roll_number} is not registered. Name (blank to cancel): ")?;
    output.flush()?;
    match read_answer(&mut input)? {
        Some(name) => Ok(AuthorizationOutcome::Authorized {
            identity: Identity::new(name, roll_number),
            roll_number,
        }),
        None => Ok(AuthorizationOutcome::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{BoundingBox, FaceIdentity, InMemoryRoster, TrackId};
    use std::io::Cursor;

    fn observation() -> Observation {
        Observation {
            track_id: TrackId::from("t3"),
            identity: FaceIdentity::Unknown,
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
            confidence: 0.2,
            timestamp_ms: 0,
        }
    }

    fn roster() -> InMemoryRoster {
        InMemoryRoster::new([Identity::new("Snehil Singh", 22052509)])
    }

    fn run(input: &str) -> (AuthorizationOutcome, String) {
        let mut out = Vec::new();
        let outcome = prompt(&roster(), Cursor::new(input.as_bytes()), &mut out, &observation()).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_registered_roll_number_authorizes() {
        let (outcome, text) = run("22052509\n");
        assert_eq!(
            outcome,
            AuthorizationOutcome::Authorized {
                identity: Identity::new("Snehil Singh", 22052509),
                roll_number: 22052509,
            }
        );
        assert!(text.contains("track t3"));
    }

    #[test]
    fn test_new_person_gives_name() {
        let (outcome, _) = run("22053596\nDev Mishra\n");
        assert_eq!(
            outcome,
            AuthorizationOutcome::Authorized {
                identity: Identity::new("Dev Mishra", 22053596),
                roll_number: 22053596,
            }
        );
    }

    #[test]
    fn test_blank_cancels() {
        assert_eq!(run("\n").0, AuthorizationOutcome::Failed);
        assert_eq!(run("").0, AuthorizationOutcome::Failed);
        assert_eq!(run("22053596\n\n").0, AuthorizationOutcome::Failed);
    }

    #[test]
    fn test_non_numeric_fails() {
        let (outcome, text) = run("abc\n");
        assert_eq!(outcome, AuthorizationOutcome::Failed);
        assert!(text.contains("not a roll number"));
    }

    #[test]
    fn test_missing_terminal_fails() {
        let mut gate = ConsoleGate::new(
            Arc::new(roster()),
            PathBuf::from("/nonexistent/presence-tty"),
        );
        assert_eq!(gate.authorize(&observation()), AuthorizationOutcome::Failed);
    }
}
