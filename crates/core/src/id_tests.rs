use super::*;

#[test]
fn uuid_gen_creates_unique_ids() {
    let id_gen = UuidIdGen;
    let id1 = id_gen.next();
    let id2 = id_gen.next();
    assert_ne!(id1, id2);
    assert_eq!(id1.len(), 36);
}

#[test]
fn sequential_gen_is_shared_across_clones() {
    let id_gen1 = SequentialIdGen::new("lease");
    let id_gen2 = id_gen1.clone();
    assert_eq!(id_gen1.next(), "lease-1");
    assert_eq!(id_gen2.next(), "lease-2");
    assert_eq!(id_gen1.next(), "lease-3");
}

#[test]
fn derived_request_id_is_stable_for_same_call() {
    let a = RequestId::derive("billing", "charge", "order-42");
    let b = RequestId::derive("billing", "charge", "order-42");
    assert_eq!(a, b);
    assert!(a.0.starts_with("derived-"));
}

#[yare::parameterized(
    other_id        = { "billing", "charge", "order-43" },
    other_operation = { "billing", "refund", "order-42" },
    other_service   = { "shipping", "charge", "order-42" },
    shifted_parts   = { "billingcharge", "", "order-42" },
)]
fn derived_request_id_differs_per_call_site(service: &str, operation: &str, id: &str) {
    let base = RequestId::derive("billing", "charge", "order-42");
    assert_ne!(RequestId::derive(service, operation, id), base);
}

#[test]
fn generated_request_ids_are_unique() {
    assert_ne!(RequestId::generate(), RequestId::generate());
}
