mod harness;

mod buf;
mod capture;
mod congestion;
mod network;
mod table;
