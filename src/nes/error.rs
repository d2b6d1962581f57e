use anyhow::anyhow;
use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

const MAX_EVENTS: usize = 512;

/// Failure categories reported through the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    InternalError,
    FileGeneralError,
    FileCouldNotOpen,
    FileCouldNotClose,
    FileAlreadyOpened,
    FileAlreadyClosed,
    FileReadError,
    FileWriteError,
    FileSeekError,
    FileTellError,
    InvalidNesFormat,
    MapperNotSupported,
    FailToLoadMemory,
    OutOfMemory,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "no error",
            Self::InternalError => "internal error",
            Self::FileGeneralError => "file operation could not be performed",
            Self::FileCouldNotOpen => "could not open file",
            Self::FileCouldNotClose => "could not close file",
            Self::FileAlreadyOpened => "file is already opened",
            Self::FileAlreadyClosed => "file is already closed",
            Self::FileReadError => "could not read all requested data from file",
            Self::FileWriteError => "could not write to file",
            Self::FileSeekError => "seek operation failed",
            Self::FileTellError => "tell operation failed",
            Self::InvalidNesFormat => "not a properly formatted NES file",
            Self::MapperNotSupported => "mapper required by game not supported",
            Self::FailToLoadMemory => "could not load memory",
            Self::OutOfMemory => "ran out of memory",
        }
    }

    /// Wraps `detail` into an error tagged with this category.
    pub fn error(self, detail: impl fmt::Display) -> anyhow::Error {
        anyhow!("{detail}").context(self)
    }

    /// Category attached to `err`, or `InternalError` when none was attached.
    pub fn of(err: &anyhow::Error) -> ErrorCode {
        err.downcast_ref::<ErrorCode>()
            .copied()
            .unwrap_or(ErrorCode::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for ErrorCode {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[!] {:02} {}", code.code(), self.message),
            None => write!(f, "[i] {}", self.message),
        }
    }
}

#[derive(Debug, Default)]
struct EventRing {
    events: VecDeque<Event>,
    error_counts: [u64; 15],
}

/// Shared handle onto a bounded ring of recent events.
///
/// Cloning the handle shares the ring; components that need to report
/// problems receive a clone at construction.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    ring: Rc<RefCell<EventRing>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, code: ErrorCode, detail: impl Into<String>) {
        if code == ErrorCode::Success {
            return;
        }
        let mut ring = self.ring.borrow_mut();
        ring.error_counts[code as usize] += 1;
        Self::push(
            &mut ring,
            Event {
                code: Some(code),
                message: format!("{code}: {}", detail.into()),
            },
        );
    }

    /// Posts `err` under the category attached to it.
    pub fn post_error(&self, err: &anyhow::Error) {
        self.post(ErrorCode::of(err), format!("{err:#}"));
    }

    pub fn note(&self, message: impl Into<String>) {
        let mut ring = self.ring.borrow_mut();
        Self::push(
            &mut ring,
            Event {
                code: None,
                message: message.into(),
            },
        );
    }

    fn push(ring: &mut EventRing, event: Event) {
        if ring.events.len() >= MAX_EVENTS {
            ring.events.pop_front();
        }
        ring.events.push_back(event);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.ring
            .borrow()
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self, code: ErrorCode) -> u64 {
        self.ring.borrow().error_counts[code as usize]
    }

    pub fn last_error(&self) -> Option<Event> {
        self.ring
            .borrow()
            .events
            .iter()
            .rev()
            .find(|event| event.code.is_some())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.ring.borrow().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut ring = self.ring.borrow_mut();
        ring.events.clear();
        ring.error_counts = [0; 15];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_code_survives_extra_context() {
        let err = Err::<(), _>(ErrorCode::FileSeekError.error("trainer skip failed"))
            .context("loading cartridge")
            .unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::FileSeekError);
        assert!(format!("{err:#}").contains("trainer skip failed"));
    }

    #[test]
    fn untagged_errors_are_internal() {
        let err = anyhow!("something odd");
        assert_eq!(ErrorCode::of(&err), ErrorCode::InternalError);
    }

    #[test]
    fn ring_drops_oldest_events() {
        let log = EventLog::new();
        for i in 0..(MAX_EVENTS + 10) {
            log.note(format!("event {i}"));
        }
        assert_eq!(log.len(), MAX_EVENTS);
        let newest = log.recent(1);
        assert_eq!(newest[0].message, format!("event {}", MAX_EVENTS + 9));
    }

    #[test]
    fn success_is_not_posted() {
        let log = EventLog::new();
        log.post(ErrorCode::Success, "nothing happened");
        assert!(log.is_empty());
        assert!(log.last_error().is_none());
    }

    #[test]
    fn clones_share_the_ring() {
        let log = EventLog::new();
        let handle = log.clone();
        handle.post(ErrorCode::MapperNotSupported, "mapper 4");
        assert_eq!(log.count(ErrorCode::MapperNotSupported), 1);
        let last = log.last_error().unwrap();
        assert_eq!(last.code, Some(ErrorCode::MapperNotSupported));
        assert_eq!(
            last.to_string(),
            "[!] 12 mapper required by game not supported: mapper 4"
        );
    }
}
