pub mod writer_test;
