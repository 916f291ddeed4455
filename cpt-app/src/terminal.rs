use anyhow::Result;
use cpt_core::{CountdownStep, Polarity};
use cpt_experiment::{AudioCue, AudioError, Cue, KeyHandle, Screen, TestSpec};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Line-oriented presentation on a terminal.
pub struct TerminalDisplay<W: Write> {
    out: W,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Instructions shown before a test's first run.
    pub fn announce(&mut self, spec: &TestSpec) -> Result<()> {
        let rule = match spec.polarity {
            Polarity::Go => format!("press Enter only when you see {}", glyph(spec.target.as_str())),
            Polarity::NoGo => format!(
                "press Enter for everything except {}",
                glyph(spec.target.as_str())
            ),
        };
        writeln!(self.out, "\n=== {} === {rule} (q + Enter quits)", spec.id)?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> cpt_experiment::Display for TerminalDisplay<W> {
    fn show(&mut self, screen: &Screen) -> Result<()> {
        match screen {
            Screen::Message(text) => writeln!(self.out, "  {text}")?,
            Screen::Countdown(CountdownStep::Count(n)) => writeln!(self.out, "  {n}")?,
            Screen::Countdown(CountdownStep::Start) => writeln!(self.out, "  START")?,
            Screen::Countdown(CountdownStep::LeadIn) | Screen::Blank => writeln!(self.out)?,
            Screen::Stimulus { round, symbol } => {
                writeln!(self.out, "  [{round:>2}]   {}", glyph(symbol.as_str()))?
            }
        }
        // the frame counts as painted once it reaches the terminal
        self.out.flush()?;
        Ok(())
    }
}

fn glyph(name: &str) -> &str {
    match name {
        "circle" => "●",
        "star" => "★",
        "triangle" => "▲",
        "square" => "■",
        other => other,
    }
}

/// Terminal bell for countdown and response cues.
pub struct Bell<W: Write + Send> {
    out: W,
}

impl Bell<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> AudioCue for Bell<W> {
    fn play(&mut self, cue: Cue) -> Result<(), AudioError> {
        debug!(?cue, hz = cue.frequency_hz(), "cue");
        self.out
            .write_all(b"\x07")
            .and_then(|()| self.out.flush())
            .map_err(|e| AudioError::Unavailable(e.to_string()))
    }
}

/// Routes stdin lines to whichever session is attached. An empty line is
/// the response key; `q` aborts; anything else is ignored.
#[derive(Clone, Default)]
pub struct Keyboard {
    current: Arc<Mutex<Option<KeyHandle>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Response,
    Quit,
}

impl Keyboard {
    pub fn spawn() -> Self {
        let keyboard = Self::default();
        let reader = keyboard.clone();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if let Some(key) = parse_key(&line) {
                    reader.dispatch(key);
                }
            }
        });
        keyboard
    }

    pub fn attach(&self, handle: KeyHandle) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn detach(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn dispatch(&self, key: Key) {
        let guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = guard.as_ref() else {
            return;
        };
        match key {
            Key::Response => handle.press(),
            Key::Quit => handle.abort(),
        };
    }
}

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim() {
        "" => Some(Key::Response),
        "q" | "Q" => Some(Key::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_core::Symbol;
    use cpt_experiment::Display as _;

    #[test]
    fn stimulus_renders_as_glyph() {
        let mut d = TerminalDisplay::new(Vec::new());
        d.show(&Screen::Stimulus {
            round: 3,
            symbol: Symbol::new("triangle"),
        })
        .unwrap();
        d.show(&Screen::Countdown(CountdownStep::Count(2))).unwrap();
        d.show(&Screen::Stimulus {
            round: 12,
            symbol: Symbol::new("4"),
        })
        .unwrap();
        let text = String::from_utf8(d.into_inner()).unwrap();
        assert_eq!(text, "  [ 3]   ▲\n  2\n  [12]   4\n");
    }

    #[test]
    fn only_enter_and_q_are_keys() {
        assert_eq!(parse_key(""), Some(Key::Response));
        assert_eq!(parse_key("q"), Some(Key::Quit));
        assert_eq!(parse_key("x"), None);
    }

    #[test]
    fn bell_writes_bel() {
        let mut bell = Bell { out: Vec::new() };
        bell.play(Cue::Start).unwrap();
        assert_eq!(bell.out, b"\x07");
    }
}
