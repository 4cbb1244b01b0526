//! Soft/hard power-cycle sequencing for the device under test.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::*;

use crate::device::Channel;
use crate::host::Host;

/// Power-off dwell before switching back on. Too short and components such
/// as flash memory never fully de-power, leaving the chip in a wedged
/// state on the next boot.
const POWER_OFF_SETTLE: Duration = Duration::from_millis(750);

/// Short dwell after power-on before handing control back.
const POWER_ON_SETTLE: Duration = Duration::from_millis(50);

/// Transient per-target power-cycle sequencer.
///
/// The only mutable state is whether a flash-mode override is currently
/// active; everything else is configuration.
pub struct Rebooter {
    host: Rc<RefCell<dyn Host>>,
    flash_mode: bool,
    strap_active_low: bool,
    power_off_settle: Duration,
    power_on_settle: Duration,
}

impl Rebooter {
    pub fn new(host: Rc<RefCell<dyn Host>>) -> Self {
        Self {
            host,
            flash_mode: false,
            strap_active_low: false,
            power_off_settle: POWER_OFF_SETTLE,
            power_on_settle: POWER_ON_SETTLE,
        }
    }

    /// Invert the strap line (for straps wired active low).
    #[must_use]
    pub fn with_active_low_strap(mut self) -> Self {
        self.strap_active_low = true;
        self
    }

    /// Override the settle dwells (tests; unusual boards).
    #[must_use]
    pub fn with_settle(mut self, off: Duration, on: Duration) -> Self {
        self.power_off_settle = off;
        self.power_on_settle = on;
        self
    }

    /// Bring the target back up.
    ///
    /// `soft` asks the host for a target-specific soft reset first; target
    /// families without one get a hard cycle instead. Host failures are
    /// fatal and propagate unretried.
    pub fn reboot(&mut self, dut: &mut dyn Channel, soft: bool) -> Result<()> {
        if soft && self.host.borrow_mut().soft_reset()? {
            debug!("soft reset issued");
            return Ok(());
        }
        self.reboot_hard(dut)
    }

    fn reboot_hard(&mut self, dut: &mut dyn Channel) -> Result<()> {
        info!("hard rebooting target");
        self.host
            .borrow_mut()
            .set_power(false)
            .context("powering target off")?;
        thread::sleep(self.power_off_settle);
        // Anything buffered up to here is pre-power-off noise; discard it
        // so the next expect starts from a clean slate.
        dut.clear_buffer();
        self.host
            .borrow_mut()
            .set_power(true)
            .context("powering target on")?;
        thread::sleep(self.power_on_settle);
        Ok(())
    }

    /// Toggle the boot strap so the next power-on enters the bootloader.
    ///
    /// Set before and cleared after a flashing sequence, in matching pairs.
    pub fn set_flash_mode(&mut self, enabled: bool) -> Result<()> {
        let level = if self.strap_active_low {
            !enabled
        } else {
            enabled
        };
        self.host
            .borrow_mut()
            .set_flash_mode(level)
            .context("driving boot strap")?;
        self.flash_mode = enabled;
        debug!("flash mode {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn flash_mode(&self) -> bool {
        self.flash_mode
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::host::testhost::{HostEvent, TestHost};

    /// Journal shared between the host double and the channel double, so
    /// ordering across both collaborators is observable.
    type Journal = Rc<RefCell<Vec<&'static str>>>;

    struct JournalingHost {
        journal: Journal,
        soft: bool,
    }

    impl Host for JournalingHost {
        fn set_power(&mut self, on: bool) -> Result<()> {
            self.journal
                .borrow_mut()
                .push(if on { "power-on" } else { "power-off" });
            Ok(())
        }

        fn set_flash_mode(&mut self, _asserted: bool) -> Result<()> {
            self.journal.borrow_mut().push("strap");
            Ok(())
        }

        fn soft_reset(&mut self) -> Result<bool> {
            if self.soft {
                self.journal.borrow_mut().push("soft-reset");
            }
            Ok(self.soft)
        }
    }

    struct JournalingChannel {
        journal: Journal,
    }

    impl Channel for JournalingChannel {
        fn write(&mut self, _data: &[u8]) -> Result<(), crate::device::ChannelError> {
            Ok(())
        }

        fn expect(
            &mut self,
            _pattern: &str,
            _timeout: Duration,
        ) -> Result<String, crate::device::ChannelError> {
            Ok(String::new())
        }

        fn clear_buffer(&mut self) {
            self.journal.borrow_mut().push("clear-buffer");
        }
    }

    fn fixture(soft: bool) -> (Rebooter, JournalingChannel, Journal) {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let host = Rc::new(RefCell::new(JournalingHost {
            journal: journal.clone(),
            soft,
        }));
        let rebooter = Rebooter::new(host).with_settle(Duration::ZERO, Duration::ZERO);
        let chan = JournalingChannel {
            journal: journal.clone(),
        };
        (rebooter, chan, journal)
    }

    #[test]
    fn hard_reboot_sequences_power_clear_power() {
        let (mut rebooter, mut chan, journal) = fixture(false);
        rebooter.reboot(&mut chan, false).unwrap();
        assert_eq!(
            *journal.borrow(),
            vec!["power-off", "clear-buffer", "power-on"]
        );
    }

    #[test]
    fn soft_reboot_without_support_falls_back_to_hard() {
        let (mut rebooter, mut chan, journal) = fixture(false);
        rebooter.reboot(&mut chan, true).unwrap();
        assert_eq!(
            *journal.borrow(),
            vec!["power-off", "clear-buffer", "power-on"]
        );
    }

    #[test]
    fn soft_reboot_uses_the_host_soft_reset() {
        let (mut rebooter, mut chan, journal) = fixture(true);
        rebooter.reboot(&mut chan, true).unwrap();
        assert_eq!(*journal.borrow(), vec!["soft-reset"]);
    }

    #[test]
    fn flash_mode_tracks_state_and_drives_the_strap() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let shared: Rc<RefCell<dyn Host>> = host.clone();
        let mut rebooter = Rebooter::new(shared);
        rebooter.set_flash_mode(true).unwrap();
        assert!(rebooter.flash_mode());
        rebooter.set_flash_mode(false).unwrap();
        assert!(!rebooter.flash_mode());
        assert_eq!(
            host.borrow().events,
            vec![HostEvent::FlashMode(true), HostEvent::FlashMode(false)]
        );
    }

    #[test]
    fn active_low_strap_inverts_the_line() {
        let host = Rc::new(RefCell::new(TestHost::new()));
        let shared: Rc<RefCell<dyn Host>> = host.clone();
        let mut rebooter = Rebooter::new(shared).with_active_low_strap();
        rebooter.set_flash_mode(true).unwrap();
        assert!(rebooter.flash_mode());
        assert_eq!(host.borrow().strap_level(), Some(false));
    }

    #[test]
    fn power_control_failure_is_fatal() {
        let host = Rc::new(RefCell::new(TestHost {
            fail_power: true,
            ..TestHost::new()
        }));
        let shared: Rc<RefCell<dyn Host>> = host.clone();
        let mut rebooter =
            Rebooter::new(shared).with_settle(Duration::ZERO, Duration::ZERO);
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut chan = JournalingChannel { journal };
        assert!(rebooter.reboot(&mut chan, false).is_err());
    }
}
