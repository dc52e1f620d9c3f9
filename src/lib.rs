pub mod buf;
pub mod capture;
pub mod mailbox;
pub mod net;
pub mod proto;
pub mod wire;

#[cfg(test)]
mod test;
