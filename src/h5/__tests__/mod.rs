pub mod roundtrip_test;
