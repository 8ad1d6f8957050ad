//! Enumeration and context-level behavior

use common::HidConfig;
use common::test_utils::{create_mock_device_record, create_mock_listing};
use hidlink::backend::mock::{MockBackend, MockDevice};
use hidlink::{BusType, HidContext, HidError, NO_ERROR};

fn context_with_listing(count: u32) -> (HidContext, MockBackend) {
    let backend = MockBackend::new();
    for record in create_mock_listing(count) {
        backend.add_device(MockDevice::new(record));
    }
    (HidContext::new(backend.clone(), HidConfig::default()), backend)
}

#[test]
fn test_enumerate_everything() {
    let (ctx, _backend) = context_with_listing(5);

    let devices = ctx.enumerate(0, 0).unwrap();
    assert_eq!(devices.len(), 5);
    assert!(devices.iter().all(|d| d.bus_type == BusType::Usb));
    assert_eq!(ctx.error(None), NO_ERROR);
}

#[test]
fn test_enumerate_filters_each_field() {
    let (ctx, backend) = context_with_listing(3);
    backend.add_device(MockDevice::new(create_mock_device_record(10, 0x0abc, 0x1001)));

    let by_vendor = ctx.enumerate(0x1234, 0).unwrap();
    assert_eq!(by_vendor.len(), 3);

    let by_product = ctx.enumerate(0, 0x1001).unwrap();
    assert_eq!(by_product.len(), 2);

    let exact = ctx.enumerate(0x0abc, 0x1001).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].path, "mock-10:1.0");
}

#[test]
fn test_enumerate_without_match_is_empty() {
    let (ctx, _backend) = context_with_listing(3);

    let devices = ctx.enumerate(0xdead, 0xbeef).unwrap();
    assert!(devices.is_empty());
    assert_eq!(ctx.error(None), NO_ERROR);
}

#[test]
fn test_enumeration_order_is_stable() {
    let (ctx, _backend) = context_with_listing(6);

    let first: Vec<String> = ctx.enumerate(0, 0).unwrap().into_iter().map(|d| d.path).collect();
    let second: Vec<String> = ctx.enumerate(0, 0).unwrap().into_iter().map(|d| d.path).collect();
    assert_eq!(first, second);

    let mut unique = first.clone();
    unique.dedup();
    assert_eq!(unique.len(), first.len());
}

#[test]
fn test_enumeration_failure_sets_global_error() {
    let (ctx, backend) = context_with_listing(2);
    backend.set_listing_failure(Some("libusb busy"));

    assert!(ctx.enumerate(0, 0).is_err());
    assert!(ctx.error(None).contains("libusb busy"));

    backend.set_listing_failure(None);
    assert_eq!(ctx.enumerate(0, 0).unwrap().len(), 2);
    assert_eq!(ctx.error(None), NO_ERROR);
}

#[test]
fn test_truncated_listing_is_a_transport_failure() {
    let (ctx, backend) = context_with_listing(3);
    backend.truncate_listing(Some(40));

    let err = ctx.enumerate(0, 0).unwrap_err();
    assert!(matches!(err, HidError::TransportFailure(_)));
    assert!(ctx.error(None).contains("Malformed record"));
    assert_eq!(ctx.open(0x1234, 0, None), Err(err));

    backend.truncate_listing(None);
    assert_eq!(ctx.enumerate(0, 0).unwrap().len(), 3);
}

#[test]
fn test_unplugged_device_disappears() {
    let (ctx, backend) = context_with_listing(2);
    backend.remove_device("mock-1:1.0");

    let devices = ctx.enumerate(0, 0).unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].path, "mock-2:1.0");
    assert_eq!(ctx.open_path("mock-1:1.0"), Err(HidError::DeviceNotFound));
}

#[test]
fn test_open_first_match() {
    let (ctx, _backend) = context_with_listing(3);

    let id = ctx.open(0x1234, 0, None).unwrap();
    assert_eq!(ctx.get_device_info(id).unwrap().path, "mock-1:1.0");

    let id = ctx.open(0x1234, 0, Some("SN000003")).unwrap();
    assert_eq!(ctx.get_device_info(id).unwrap().product_id, 0x1003);
    assert_eq!(ctx.open_sessions().len(), 2);
}

#[test]
fn test_open_unknown_device() {
    let (ctx, _backend) = context_with_listing(1);

    assert_eq!(ctx.open(0x9999, 0x0001, None), Err(HidError::DeviceNotFound));
    assert_eq!(ctx.error(None), "Device not found");
    assert!(ctx.open_sessions().is_empty());
}

#[test]
fn test_manual_initialization() {
    let backend = MockBackend::new();
    backend.add_device(MockDevice::new(create_mock_device_record(1, 0x1234, 0x0001)));

    let mut config = HidConfig::default();
    config.backend.auto_initialize = false;
    let ctx = HidContext::new(backend, config);

    assert_eq!(ctx.open_path("mock-1:1.0"), Err(HidError::NotInitialized));
    ctx.initialize().unwrap();
    ctx.initialize().unwrap();

    let id = ctx.open_path("mock-1:1.0").unwrap();
    ctx.exit().unwrap();
    assert_eq!(ctx.read(id, 8), Err(HidError::HandleInvalid));
    assert_eq!(ctx.enumerate(0, 0), Err(HidError::NotInitialized));
}

#[test]
fn test_version() {
    assert_eq!(HidContext::version_str(), "0.15.0");
    assert_eq!(HidContext::version().as_u32(), 15 << 8);
}
