//! Query-string parsing for `/servers`

use relay_core::{CapabilityFilter, CoreError, Result};
use reqwest::Url;

/// What a `/servers` request asks for
#[derive(Clone, Debug, PartialEq)]
pub enum ServersQuery {
    /// `lat`, `long` and `limit` given, optionally `capability`
    Nearest {
        lat: f64,
        long: f64,
        limit: i64,
        filter: CapabilityFilter,
    },
    /// `country` given
    Country(String),
    /// Neither form given; answered with an empty list
    Unspecified,
}

/// Parse the raw query string of a `/servers` request.
///
/// Coordinates take precedence over `country`. `capability` may repeat or
/// hold a comma-separated list; without it every known capability is
/// required.
pub fn parse_servers_query(query: Option<&str>) -> Result<ServersQuery> {
    let mut lat = None;
    let mut long = None;
    let mut limit = None;
    let mut country = None;
    let mut capabilities: Vec<String> = Vec::new();

    if let Some(query) = query {
        let url = Url::parse(&format!("http://relay.invalid/servers?{}", query))
            .map_err(|e| CoreError::InvalidArgument(format!("bad query string: {}", e)))?;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "lat" => lat = Some(value.into_owned()),
                "long" => long = Some(value.into_owned()),
                "limit" => limit = Some(value.into_owned()),
                "country" => country = Some(value.into_owned()),
                "capability" => capabilities.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
    }

    if lat.is_some() || long.is_some() || limit.is_some() {
        let (lat, long, limit) = match (lat, long, limit) {
            (Some(lat), Some(long), Some(limit)) => (lat, long, limit),
            _ => {
                return Err(CoreError::InvalidArgument(
                    "lat, long and limit must be given together".to_string(),
                ))
            }
        };

        let lat = lat
            .parse::<f64>()
            .map_err(|_| CoreError::InvalidArgument("failed parsing lat/long into float".to_string()))?;
        let long = long
            .parse::<f64>()
            .map_err(|_| CoreError::InvalidArgument("failed parsing lat/long into float".to_string()))?;
        let limit = limit
            .parse::<i64>()
            .map_err(|_| CoreError::InvalidArgument("failed parsing limit into int".to_string()))?;

        let filter = if capabilities.is_empty() {
            CapabilityFilter::default()
        } else {
            CapabilityFilter::from_names(&capabilities)?
        };

        return Ok(ServersQuery::Nearest {
            lat,
            long,
            limit,
            filter,
        });
    }

    match country {
        Some(country) if !country.is_empty() => Ok(ServersQuery::Country(country)),
        _ => Ok(ServersQuery::Unspecified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Capability;

    #[test]
    fn test_nearest_query() {
        let query = parse_servers_query(Some("lat=51.53&long=-0.1854&limit=10")).unwrap();
        assert_eq!(
            query,
            ServersQuery::Nearest {
                lat: 51.53,
                long: -0.1854,
                limit: 10,
                filter: CapabilityFilter::all(),
            }
        );
    }

    #[test]
    fn test_nearest_with_capabilities() {
        let query =
            parse_servers_query(Some("lat=1&long=2&limit=3&capability=openvpn_tcp&capability=wireguard_udp"))
                .unwrap();
        let ServersQuery::Nearest { filter, .. } = query else {
            panic!("expected nearest query");
        };
        assert_eq!(
            filter,
            CapabilityFilter::requiring([Capability::OpenvpnTcp, Capability::WireguardUdp])
        );

        let query = parse_servers_query(Some("lat=1&long=2&limit=3&capability=openvpn_udp,openvpn_tcp")).unwrap();
        let ServersQuery::Nearest { filter, .. } = query else {
            panic!("expected nearest query");
        };
        assert_eq!(filter.required().len(), 2);
    }

    #[test]
    fn test_country_query_is_decoded() {
        assert_eq!(
            parse_servers_query(Some("country=United%20Kingdom")).unwrap(),
            ServersQuery::Country("United Kingdom".to_string())
        );
        assert_eq!(
            parse_servers_query(Some("country=Bosnia+and+Herzegovina")).unwrap(),
            ServersQuery::Country("Bosnia and Herzegovina".to_string())
        );
    }

    #[test]
    fn test_coordinates_take_precedence() {
        let query = parse_servers_query(Some("country=France&lat=1&long=2&limit=3")).unwrap();
        assert!(matches!(query, ServersQuery::Nearest { .. }));
    }

    #[test]
    fn test_unspecified_query() {
        assert_eq!(parse_servers_query(None).unwrap(), ServersQuery::Unspecified);
        assert_eq!(parse_servers_query(Some("country=")).unwrap(), ServersQuery::Unspecified);
    }

    #[test]
    fn test_invalid_queries() {
        for bad in [
            "lat=1&long=2",
            "lat=abc&long=2&limit=3",
            "lat=1&long=2&limit=ten",
            "lat=1&long=2&limit=3&capability=socks",
        ] {
            assert!(
                matches!(parse_servers_query(Some(bad)), Err(CoreError::InvalidArgument(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_negative_limit_is_parsed() {
        let query = parse_servers_query(Some("lat=1&long=2&limit=-1")).unwrap();
        assert!(matches!(query, ServersQuery::Nearest { limit: -1, .. }));
    }
}
