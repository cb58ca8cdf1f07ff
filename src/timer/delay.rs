use crate::clock::MicrosClock;
use crate::consts::TE_US;
use crate::driver::DaliDriver;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Runs a blocking loop that pumps a DALI driver from a delay provider.
///
/// This is a simple timing loop for environments where interrupts are
/// unavailable or undesired: the transmitter is ticked once per Te and the
/// bus is sampled four times per Te so the decoder still sees edges.
///
/// # Arguments
/// - `driver`: the bus engine to pump.
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL.
///
/// # Example
/// ```rust,ignore
/// use dali_master::timer::run_tick_loop;
/// let mut driver = DaliDriver::new(tx, rx, clock);
/// run_tick_loop(&mut driver, &mut delay);
/// ```
///
/// # Notes
/// - This loop never returns; it is intended for single-purpose polling
///   firmware. Anything that also needs the command layer should use
///   [`crate::master::OwnedDriver`], which pumps the same way between
///   polls.
/// - Sampled edge timestamps carry up to Te/4 of quantization; the ±25%
///   classification window absorbs it.
pub fn run_tick_loop<D, TX, RX, CLK>(driver: &mut DaliDriver<TX, RX, CLK>, delay: &mut D)
where
    D: DelayNs,
    TX: OutputPin,
    RX: InputPin,
    CLK: MicrosClock,
{
    loop {
        driver.tick();
        for _ in 0..4 {
            delay.delay_us(TE_US / 4);
            driver.poll_edges();
        }
    }
}
