mod account;
mod auth;
mod create_ticket;
mod dashboard;
mod ticket_detail;
mod ticket_list;

pub use account::{PasswordView, ProfileView};
pub use auth::LoginView;
pub use create_ticket::CreateTicketView;
pub use dashboard::DashboardView;
pub use ticket_detail::TicketDetailView;
pub use ticket_list::{TicketListView, TicketScope};
