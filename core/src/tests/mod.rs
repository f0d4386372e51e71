mod common;

mod keys;
mod persistence;
mod transactions;
