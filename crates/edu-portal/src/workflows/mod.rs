pub mod applications;
pub mod cms;
pub mod documents;
pub mod inquiries;
pub mod notifications;
pub mod portal;
pub mod profiles;

#[cfg(test)]
mod tests;
