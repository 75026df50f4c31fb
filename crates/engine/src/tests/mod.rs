mod helpers;
mod read_tests;
mod schema_tests;
mod tx_tests;
