use std::net::IpAddr;

use sysinfo::Networks;

/// Names of interfaces carrying at least one non-loopback IPv6 address
pub fn usable_interfaces() -> Vec<String> {
    let networks = Networks::new_with_refreshed_list();
    select_ipv6_interfaces(networks.list().iter().map(|(name, data)| {
        (
            name.as_str(),
            data.ip_networks().iter().map(|net| net.addr).collect::<Vec<_>>(),
        )
    }))
}

pub fn select_ipv6_interfaces<'a, I>(interfaces: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, Vec<IpAddr>)>,
{
    let mut names: Vec<String> = interfaces
        .into_iter()
        .filter(|(_, addrs)| {
            addrs
                .iter()
                .any(|addr| addr.is_ipv6() && !addr.is_loopback())
        })
        .map(|(name, _)| name.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_non_loopback_ipv6() {
        let selected = select_ipv6_interfaces(vec![
            ("lo", vec!["::1".parse().unwrap(), "127.0.0.1".parse().unwrap()]),
            ("eth0", vec!["192.168.1.4".parse().unwrap(), "fe80::1".parse().unwrap()]),
            ("wlan0", vec!["10.0.0.2".parse().unwrap()]),
            ("eth0", vec!["2001:db8::2".parse().unwrap()]),
        ]);
        assert_eq!(selected, vec!["eth0"]);
    }

    #[test]
    fn test_listing_host_interfaces_does_not_panic() {
        let interfaces = usable_interfaces();
        assert!(interfaces.iter().all(|name| name != "lo"));
    }
}
