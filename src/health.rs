//! Lifeguard-style local health multiplier: stretches probe timeout and
//! protocol interval under local stress (spec §4.6).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    SuccessfulProbe,
    FailedProbe,
    ProbeWithMissedNack,
    RefutingSuspectMessageAboutSelf,
}

#[derive(Debug)]
pub struct LocalHealthMultiplier {
    value: u32,
    max: u32,
}

impl LocalHealthMultiplier {
    pub fn new(max: u32) -> Self {
        LocalHealthMultiplier { value: 0, max }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn adjust(&mut self, event: HealthEvent) {
        match event {
            HealthEvent::SuccessfulProbe => self.value = self.value.saturating_sub(1),
            HealthEvent::FailedProbe
            | HealthEvent::ProbeWithMissedNack
            | HealthEvent::RefutingSuspectMessageAboutSelf => {
                self.value = (self.value + 1).min(self.max)
            }
        }
    }

    /// `base × (1 + LHM)`.
    pub fn scale(&self, base: Duration) -> Duration {
        base * (1 + self.value)
    }
}
