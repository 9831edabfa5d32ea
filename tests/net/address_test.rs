/*!
 * Address Codec Tests
 * Wire layout and host/network order conversion
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::net::{Ipv4Addr, SocketAddrV4};
use unisockets::net::{decode, encode, htons, ntohs, Address, WireAddress, WIRE_ADDRESS_LEN};

#[test]
fn test_echo_server_address_bytes() {
    let addr: Address = "10.0.0.240:1234".parse().unwrap();
    let bytes = encode(&addr).to_bytes();

    assert_eq!(&bytes[2..4], &[0x04, 0xd2]);
    assert_eq!(&bytes[4..8], &[10, 0, 0, 240]);
    assert_eq!(&bytes[8..], &[0u8; 8]);
}

#[test]
fn test_htons_matches_big_endian() {
    assert_eq!(htons(1234).to_ne_bytes(), 1234u16.to_be_bytes());
    assert_eq!(ntohs(htons(1234)), 1234);
}

#[test]
fn test_decode_rejects_unknown_family() {
    let mut wire = encode(&Address::new(Ipv4Addr::LOCALHOST, 80));
    wire.family = 10;
    assert!(decode(&wire).is_err());
}

#[test]
fn test_short_byte_image() {
    assert!(WireAddress::from_bytes(&[0u8; WIRE_ADDRESS_LEN - 1]).is_err());
}

#[test]
fn test_display_and_parse() {
    let addr = Address::new(Ipv4Addr::new(192, 168, 1, 20), 8080);
    assert_eq!(addr.to_string(), "192.168.1.20:8080");
    assert_eq!("192.168.1.20:8080".parse::<Address>().unwrap(), addr);
    assert!("192.168.1.20".parse::<Address>().is_err());
}

proptest! {
    #[test]
    fn prop_wire_round_trip(octets in any::<[u8; 4]>(), port in any::<u16>()) {
        let addr = Address::new(Ipv4Addr::from(octets), port);
        let wire = WireAddress::from_bytes(&encode(&addr).to_bytes()).unwrap();
        prop_assert_eq!(decode(&wire).unwrap(), addr);
        prop_assert_eq!(SocketAddrV4::from(addr), SocketAddrV4::new(Ipv4Addr::from(octets), port));
    }
}
