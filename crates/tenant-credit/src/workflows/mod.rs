pub mod credit_check;
