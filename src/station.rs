//! HF time-standard stations whose broadcasts are recorded.

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Station {
    /// Fort Collins, Colorado
    Wwv,
    /// Kekaha, Kauai, Hawaii
    Wwvh,
    /// Ottawa, Canada
    Chu,
    /// Pucheng County, Shaanxi, China
    Bpm,
}

impl Station {
    pub const ALL: [Station; 4] = [Station::Wwvh, Station::Wwv, Station::Chu, Station::Bpm];

    pub fn call_sign(self) -> &'static str {
        match self {
            Station::Wwv => "WWV",
            Station::Wwvh => "WWVH",
            Station::Chu => "CHU",
            Station::Bpm => "BPM",
        }
    }

    /// Transmitter (latitude, longitude) in degrees.
    pub fn location(self) -> (f64, f64) {
        match self {
            Station::Wwv => (40.6796, -105.0411),
            Station::Wwvh => (21.9868, -159.7561),
            Station::Chu => (45.2974, -75.7663),
            Station::Bpm => (34.9489, 109.5430),
        }
    }

    /// Station a channel name refers to, by its leading call sign.
    ///
    /// `ALL` lists WWVH before WWV so the longer call sign wins.
    pub fn from_channel_name(name: &str) -> Option<Station> {
        let first = name.split_whitespace().next()?.to_ascii_uppercase();
        Station::ALL
            .into_iter()
            .find(|s| first == s.call_sign())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_from_channel_name() {
        assert_eq!(Station::from_channel_name("WWV 10 MHz"), Some(Station::Wwv));
        assert_eq!(Station::from_channel_name("WWVH 15 MHz"), Some(Station::Wwvh));
        assert_eq!(Station::from_channel_name("chu 7.85 MHz"), Some(Station::Chu));
        assert_eq!(Station::from_channel_name("Shared 5 MHz"), None);
        assert_eq!(Station::from_channel_name(""), None);
    }

    #[test]
    fn test_station_locations_in_range() {
        for s in Station::ALL {
            let (lat, lon) = s.location();
            assert!((-90.0..=90.0).contains(&lat));
            assert!((-180.0..=180.0).contains(&lon));
        }
    }
}
