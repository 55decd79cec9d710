//! Digitized channel readout.

use crate::address::StsAddress;
use crate::link::Match;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One quantized readout of a module channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Digi {
    /// Module address.
    pub address: StsAddress,
    /// Module channel.
    pub channel: u16,
    /// Time stamp [ns].
    pub time: u64,
    /// ADC code, always below the ASIC's number of ADC levels.
    pub adc: u16,
    /// Contributing trajectory segments.
    pub provenance: Match,
}

impl Digi {
    /// Creates a new digi.
    #[must_use]
    pub fn new(address: StsAddress, channel: u16, time: u64, adc: u16, provenance: Match) -> Self {
        Self {
            address,
            channel,
            time,
            adc,
            provenance,
        }
    }

    /// Time as floating point nanoseconds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_ns(&self) -> f64 {
        self.time as f64
    }

    /// True if the digi was produced by noise only.
    #[inline]
    #[must_use]
    pub fn is_noise(&self) -> bool {
        self.provenance.is_empty()
    }
}

/// Sorts digis by module, then time, then channel.
///
/// Cluster finding requires digis of one module in non-decreasing time.
pub fn sort_digis(digis: &mut [Digi]) {
    digis.sort_by(|a, b| {
        a.address
            .cmp(&b.address)
            .then(a.time.cmp(&b.time))
            .then(a.channel.cmp(&b.channel))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_digis() {
        let m0 = StsAddress::module(0, 0, 0, 0).unwrap();
        let m1 = StsAddress::module(0, 0, 0, 1).unwrap();
        let mut digis = vec![
            Digi::new(m1, 3, 10, 1, Match::new()),
            Digi::new(m0, 7, 20, 1, Match::new()),
            Digi::new(m0, 2, 20, 1, Match::new()),
            Digi::new(m0, 9, 5, 1, Match::new()),
        ];
        sort_digis(&mut digis);
        let order: Vec<(u32, u64, u16)> = digis
            .iter()
            .map(|d| (d.address.module_number(), d.time, d.channel))
            .collect();
        assert_eq!(order, vec![(0, 5, 9), (0, 20, 2), (0, 20, 7), (1, 10, 3)]);
    }
}
