//! Country lookup for IPv4 addresses using an ordered range table.
//!
//! Addresses are converted to their 32-bit integer value and matched
//! against `(start, end, country)` entries. Matching is strict on both
//! ends: a value equal to `start` or `end` does not match that entry.

use anyhow::{anyhow, Context, Result};
use std::borrow::Cow;
use std::path::Path;

use crate::analytics::user_agent::UNKNOWN;

/// One entry of the country range table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub start: u32,
    pub end: u32,
    pub country: Cow<'static, str>,
}

impl IpRange {
    pub const fn new(start: u32, end: u32, country: &'static str) -> Self {
        Self {
            start,
            end,
            country: Cow::Borrowed(country),
        }
    }

    fn contains(&self, value: u32) -> bool {
        self.start < value && value < self.end
    }
}

/// Compiled-in ranges, taken from regional registry allocations.
static BUILTIN_RANGES: [IpRange; 41] = [
    IpRange::new(16777216, 16777471, "AU"),     // 1.0.0.0/24
    IpRange::new(16777472, 16777727, "CN"),     // 1.0.1.0/24
    IpRange::new(16777728, 16778239, "CN"),     // 1.0.2.0/23
    IpRange::new(16778240, 16779263, "AU"),     // 1.0.4.0/22
    IpRange::new(16779264, 16781311, "CN"),     // 1.0.8.0/21
    IpRange::new(16781312, 16785407, "JP"),     // 1.0.16.0/20
    IpRange::new(16785408, 16793599, "CN"),     // 1.0.32.0/19
    IpRange::new(16793600, 16809983, "JP"),     // 1.0.64.0/18
    IpRange::new(16809984, 16842751, "TH"),     // 1.0.128.0/17
    IpRange::new(16842752, 16843007, "CN"),     // 1.1.0.0/24
    IpRange::new(16843008, 16843263, "AU"),     // 1.1.1.0/24
    IpRange::new(33554432, 34603007, "FR"),     // 2.0.0.0/12
    IpRange::new(34603008, 35127295, "EU"),     // 2.16.0.0/13
    IpRange::new(50331648, 67108863, "US"),     // 3.0.0.0/8
    IpRange::new(84410368, 84418559, "RU"),     // 5.8.0.0/19
    IpRange::new(134217728, 142606335, "US"),   // 8.0.0.0/9
    IpRange::new(201326592, 218103807, "US"),   // 12.0.0.0/8
    IpRange::new(234881024, 234883071, "JP"),   // 14.0.0.0/21
    IpRange::new(405798912, 405929983, "CA"),   // 24.48.0.0/15
    IpRange::new(452984832, 452985855, "JP"),   // 27.0.0.0/22
    IpRange::new(520093696, 520159231, "GB"),   // 31.0.0.0/16
    IpRange::new(620756992, 621281279, "IT"),   // 37.0.0.0/13
    IpRange::new(687865856, 689963007, "ZA"),   // 41.0.0.0/11
    IpRange::new(736100352, 736624639, "IN"),   // 43.224.0.0/13
    IpRange::new(771751936, 772014079, "DE"),   // 46.0.0.0/14
    IpRange::new(822083584, 822149119, "KR"),   // 49.0.0.0/16
    IpRange::new(973078528, 973209599, "CN"),   // 58.0.0.0/15
    IpRange::new(1023410176, 1023672319, "KR"), // 61.0.0.0/14
    IpRange::new(1291845632, 1291976703, "ES"), // 77.0.0.0/15
    IpRange::new(1358954496, 1359216639, "NL"), // 81.0.0.0/14
    IpRange::new(1526726656, 1530920959, "DE"), // 91.0.0.0/10
    IpRange::new(1694498816, 1694760959, "IN"), // 101.0.0.0/14
    IpRange::new(1845493760, 1845559295, "CN"), // 110.0.0.0/16
    IpRange::new(2231369728, 2248146943, "JP"), // 133.0.0.0/8
    IpRange::new(2516582400, 2533359615, "JP"), // 150.0.0.0/8
    IpRange::new(2969567232, 2986344447, "BR"), // 177.0.0.0/8
    IpRange::new(3120562176, 3120693247, "AR"), // 186.0.0.0/15
    IpRange::new(3170893824, 3187671039, "MX"), // 189.0.0.0/8
    IpRange::new(3288334336, 3288596479, "ZA"), // 196.0.0.0/14
    IpRange::new(3355443200, 3355508735, "BR"), // 200.0.0.0/16
    IpRange::new(3405774848, 3405791231, "AU"), // 203.0.0.0/18
];

/// Ordered range table used to resolve countries.
#[derive(Debug, Clone)]
pub struct CountryTable {
    ranges: Cow<'static, [IpRange]>,
}

impl CountryTable {
    /// The compiled-in table.
    pub fn builtin() -> Self {
        Self {
            ranges: Cow::Borrowed(&BUILTIN_RANGES),
        }
    }

    pub fn from_ranges(ranges: Vec<IpRange>) -> Self {
        Self {
            ranges: Cow::Owned(ranges),
        }
    }

    /// Load a table from a text file of `start,end,country` lines.
    ///
    /// Blank lines and lines starting with `#` are ignored. Order is kept:
    /// the first matching entry wins.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read country ranges at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid country ranges in {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let mut ranges = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [start, end, country] = fields.as_slice() else {
                return Err(anyhow!("line {}: expected start,end,country", idx + 1));
            };

            ranges.push(IpRange {
                start: start
                    .parse()
                    .with_context(|| format!("line {}: bad range start", idx + 1))?,
                end: end
                    .parse()
                    .with_context(|| format!("line {}: bad range end", idx + 1))?,
                country: Cow::Owned(country.to_string()),
            });
        }

        Ok(Self::from_ranges(ranges))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Country code for a remote address, or `"Unknown"`.
    pub fn lookup(&self, addr: &str) -> &str {
        find_range(&self.ranges, addr).map_or(UNKNOWN, |range| range.country.as_ref())
    }
}

impl Default for CountryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// First entry of `ranges` strictly containing `addr`.
fn find_range<'a>(ranges: &'a [IpRange], addr: &str) -> Option<&'a IpRange> {
    let value = ipv4_value(addr)?;
    ranges.iter().find(|range| range.contains(value))
}

/// Integer value of a dotted-quad address with an optional `:port` suffix.
///
/// Each octet must fit in a byte, so `"1.0.0.300"` has no value.
fn ipv4_value(addr: &str) -> Option<u32> {
    let host = addr.split_once(':').map_or(addr, |(host, _)| host);

    let mut octets = [0u8; 4];
    let mut parts = host.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }

    Some(u32::from_be_bytes(octets))
}

/// Resolve a country with the compiled-in table.
pub fn classify_country(addr: &str) -> &'static str {
    let ranges: &'static [IpRange] = &BUILTIN_RANGES;
    find_range(ranges, addr).map_or(UNKNOWN, |range| range.country.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_ipv4_value() {
        assert_eq!(ipv4_value("1.0.0.23"), Some(16777239));
        assert_eq!(ipv4_value("8.8.8.8:443"), Some(134744072));
        assert_eq!(ipv4_value("255.255.255.255"), Some(u32::MAX));
        assert_eq!(ipv4_value("1.2.3"), None);
        assert_eq!(ipv4_value("1.2.3.4.5"), None);
        assert_eq!(ipv4_value("1.2.x.4"), None);
        assert_eq!(ipv4_value("1.2.256.4"), None);
        assert_eq!(ipv4_value(""), None);
    }

    #[test]
    fn test_classify_country() {
        assert_eq!(classify_country("1.0.0.23"), "AU");
        assert_eq!(classify_country("1.0.0.23:51234"), "AU");
        assert_eq!(classify_country("1.0.1.7"), "CN");
        assert_eq!(classify_country("8.8.8.8"), "US");
        assert_eq!(classify_country("127.0.0.1"), UNKNOWN);
        assert_eq!(classify_country("[::1]:8080"), UNKNOWN);
        assert_eq!(classify_country("not an address"), UNKNOWN);
        assert_eq!(classify_country("1.0.0.300"), UNKNOWN);
    }

    #[test]
    fn test_range_boundaries_are_exclusive() {
        // 1.0.0.0 and 1.0.0.255 are the start and end of the first entry.
        assert_eq!(classify_country("1.0.0.0"), UNKNOWN);
        assert_eq!(classify_country("1.0.0.1"), "AU");
        assert_eq!(classify_country("1.0.0.254"), "AU");
        assert_eq!(classify_country("1.0.0.255"), UNKNOWN);
    }

    #[test]
    fn test_first_matching_entry_wins() {
        let table = CountryTable::from_ranges(vec![
            IpRange::new(0, 100, "AA"),
            IpRange::new(0, 1000, "BB"),
        ]);
        assert_eq!(table.lookup("0.0.0.50"), "AA");
        assert_eq!(table.lookup("0.0.1.0"), "BB");
        assert_eq!(table.lookup("0.0.0.0"), UNKNOWN);
    }

    #[test]
    fn test_builtin_table_matches_free_function() {
        let table = CountryTable::builtin();
        for addr in ["1.0.0.23", "41.1.2.3", "203.0.10.10", "127.0.0.1"] {
            assert_eq!(table.lookup(addr), classify_country(addr));
        }
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# start,end,country").unwrap();
        writeln!(file, "16777216, 16777471, NZ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "134217728,142606335,US").unwrap();

        let table = CountryTable::from_path(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("1.0.0.23"), "NZ");
        assert_eq!(table.lookup("8.8.8.8"), "US");
    }

    #[test]
    fn test_from_path_rejects_malformed_lines() {
        assert!(CountryTable::parse("1,2").is_err());
        assert!(CountryTable::parse("a,2,US").is_err());
        assert!(CountryTable::from_path("/nonexistent/ranges.csv").is_err());
    }
}
