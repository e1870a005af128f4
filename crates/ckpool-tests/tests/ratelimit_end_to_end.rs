//! Ten distinct IPs hit a limiter whose global cap is 5: the first five
//! succeed, the next five are denied, and freeing one slot lets an eleventh
//! IP in.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use ckpool_core::SystemClock;
use ckpool_ratelimit::{RateLimiter, RateLimiterConfig};

fn ip(last_octet: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet))
}

#[test]
fn global_cap_denies_overflow_then_admits_after_disconnect() {
    let config = RateLimiterConfig {
        global_max_connections: 5,
        ..RateLimiterConfig::default()
    };
    let limiter = RateLimiter::new(config, Arc::new(SystemClock));

    for i in 1..=5u8 {
        assert!(limiter.connect(ip(i)), "IP .{i} should have been admitted");
    }
    for i in 6..=10u8 {
        assert!(!limiter.connect(ip(i)), "IP .{i} should have been denied");
    }

    limiter.disconnect(ip(1));
    assert!(limiter.connect(ip(11)), "IP .11 should be admitted after a slot frees up");
}
