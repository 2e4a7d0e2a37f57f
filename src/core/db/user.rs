use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uuid: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub(super) _guard: (),
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Labels of the form fields left blank, in form order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.first_name.trim().is_empty() {
            missing.push("First Name");
        }
        if self.last_name.trim().is_empty() {
            missing.push("Last Name");
        }
        if self.email.trim().is_empty() {
            missing.push("Email");
        }
        missing
    }
}

pub trait UserRepository {
    fn add_user(&self, user: NewUser) -> impl Future<Output = anyhow::Result<User>> + Send;
    fn get_users(&self) -> impl Future<Output = anyhow::Result<Vec<User>>> + Send;
    fn get_user_names(&self) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;
    fn get_user_emails(&self) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;
    fn get_uuid_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = anyhow::Result<Option<User>>> + Send;
    fn get_user(&self, uuid: &str) -> impl Future<Output = anyhow::Result<Option<User>>> + Send;
    fn delete_user(&self, uuid: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}
