use std::fmt;

/// Meaning of each bit of the working state field, lowest bit first.
const FLAGS: [&str; 16] = [
    "charging",
    "discharging",
    "overcharge protection",
    "discharge protection",
    "overcharged",
    "short circuit",
    "discharge protection 1",
    "discharge protection 2",
    "overheated (charging)",
    "undercooled (charging)",
    "overheated (discharging)",
    "undercooled (discharging)",
    "DFET on",
    "CFET on",
    "DFET switch on",
    "CFET switch on",
];

/// One-word summary of a working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Normal,
    Protection,
    ShortCircuit,
    Overheated,
    Undercooled,
    Unknown,
}

/// The 16 bit working state reported in the realtime frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingState(pub u16);

impl WorkingState {
    pub fn status(self) -> Status {
        let bits = self.0;
        if bits & 0xF003 >= 0xF000 {
            Status::Normal
        } else if bits & 0x000C != 0 {
            Status::Protection
        } else if bits & 0x0020 != 0 {
            Status::ShortCircuit
        } else if bits & 0x0500 != 0 {
            Status::Overheated
        } else if bits & 0x0A00 != 0 {
            Status::Undercooled
        } else {
            Status::Unknown
        }
    }

    /// Labels of the bits that are set.
    pub fn flags(self) -> impl Iterator<Item = &'static str> {
        FLAGS
            .iter()
            .enumerate()
            .filter(move |(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, label)| *label)
    }
}

impl fmt::Display for WorkingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<_> = self.flags().collect();
        write!(f, "{}", flags.join(" | "))
    }
}
