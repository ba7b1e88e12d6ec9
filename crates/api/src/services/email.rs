//! Transactional email.
//!
//! Messages are rendered from Askama templates into multipart text + HTML
//! bodies. [`EmailService`] delivers them over SMTP via lettre; [`LogMailer`]
//! only logs them, for environments without an SMTP relay.

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use orchard_core::Email;

use crate::config::EmailConfig;
use crate::models::{Order, Product};

/// HTML template for the new product announcement.
#[derive(Template)]
#[template(path = "email/new_product.html")]
struct NewProductEmailHtml<'a> {
    name: &'a str,
    product_name: &'a str,
    category: &'a str,
    price: String,
    image_url: Option<&'a str>,
    product_url: &'a str,
}

/// Plain text template for the new product announcement.
#[derive(Template)]
#[template(path = "email/new_product.txt")]
struct NewProductEmailText<'a> {
    name: &'a str,
    product_name: &'a str,
    category: &'a str,
    price: String,
    product_url: &'a str,
}

/// One order line as shown in the status email.
struct LineView {
    name: String,
    quantity: u32,
    unit_price: String,
    subtotal: String,
}

/// HTML template for the order status email.
#[derive(Template)]
#[template(path = "email/status_changed.html")]
struct StatusChangedEmailHtml<'a> {
    name: &'a str,
    order_id: i64,
    status: &'a str,
    lines: &'a [LineView],
    total: String,
    street: &'a str,
    city: &'a str,
    postal_code: &'a str,
}

/// Plain text template for the order status email.
#[derive(Template)]
#[template(path = "email/status_changed.txt")]
struct StatusChangedEmailText<'a> {
    name: &'a str,
    order_id: i64,
    status: &'a str,
    lines: &'a [LineView],
    total: String,
    street: &'a str,
    city: &'a str,
    postal_code: &'a str,
}

/// HTML template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
}

/// Plain text template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    name: &'a str,
    reset_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Delivery refused by the transport for another reason.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A message the shop can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailMessage {
    /// A product was added to the catalog.
    NewProduct {
        recipient_name: String,
        product: Product,
        product_url: String,
    },
    /// An order changed status. Carries the full order with its lines.
    StatusChanged {
        recipient_name: String,
        order: Order,
    },
    /// A password reset link.
    PasswordReset {
        recipient_name: String,
        reset_url: String,
    },
}

/// A message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl MailMessage {
    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::NewProduct { product, .. } => format!("New Product Available: {}", product.name),
            Self::StatusChanged { order, .. } => {
                format!("Order #{} Status Updated - {}", order.id, order.status)
            }
            Self::PasswordReset { .. } => "Reset Your Password - Orchard".to_owned(),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewProduct { .. } => "new_product",
            Self::StatusChanged { .. } => "status_changed",
            Self::PasswordReset { .. } => "password_reset",
        }
    }

    /// Render subject and both bodies.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if a template fails to render.
    pub fn render(&self) -> Result<RenderedMail, EmailError> {
        let (text, html) = match self {
            Self::NewProduct {
                recipient_name,
                product,
                product_url,
            } => {
                let html = NewProductEmailHtml {
                    name: recipient_name,
                    product_name: &product.name,
                    category: &product.category,
                    price: format!("${}", product.price),
                    image_url: product.image_url.as_deref(),
                    product_url,
                }
                .render()?;
                let text = NewProductEmailText {
                    name: recipient_name,
                    product_name: &product.name,
                    category: &product.category,
                    price: format!("${}", product.price),
                    product_url,
                }
                .render()?;
                (text, html)
            }
            Self::StatusChanged {
                recipient_name,
                order,
            } => {
                let lines: Vec<LineView> = order
                    .items
                    .iter()
                    .map(|item| LineView {
                        name: item.product.as_ref().map_or_else(
                            || format!("Product #{}", item.product_id),
                            |p| p.name.clone(),
                        ),
                        quantity: item.quantity.get(),
                        unit_price: format!("${}", item.unit_price),
                        subtotal: format!("${}", item.subtotal()),
                    })
                    .collect();
                let address = &order.delivery_address;
                let html = StatusChangedEmailHtml {
                    name: recipient_name,
                    order_id: order.id.as_i64(),
                    status: order.status.as_str(),
                    lines: &lines,
                    total: format!("${}", order.total_amount),
                    street: &address.street,
                    city: &address.city,
                    postal_code: &address.postal_code,
                }
                .render()?;
                let text = StatusChangedEmailText {
                    name: recipient_name,
                    order_id: order.id.as_i64(),
                    status: order.status.as_str(),
                    lines: &lines,
                    total: format!("${}", order.total_amount),
                    street: &address.street,
                    city: &address.city,
                    postal_code: &address.postal_code,
                }
                .render()?;
                (text, html)
            }
            Self::PasswordReset {
                recipient_name,
                reset_url,
            } => {
                let html = PasswordResetEmailHtml {
                    name: recipient_name,
                    reset_url,
                }
                .render()?;
                let text = PasswordResetEmailText {
                    name: recipient_name,
                    reset_url,
                }
                .render()?;
                (text, html)
            }
        };

        Ok(RenderedMail {
            subject: self.subject(),
            text,
            html,
        })
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Render `message` and deliver it to `to`.
    async fn send(&self, to: &Email, message: &MailMessage) -> Result<(), EmailError>;
}

/// Email service delivering over SMTP.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(&self, to: &str, mail: RenderedMail) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(&mail.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %mail.subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, to: &Email, message: &MailMessage) -> Result<(), EmailError> {
        let mail = message.render()?;
        self.send_multipart_email(to.as_str(), mail).await
    }
}

/// Mailer that renders messages and logs them instead of sending.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &Email, message: &MailMessage) -> Result<(), EmailError> {
        let mail = message.render()?;
        tracing::info!(
            to = %to,
            kind = message.kind(),
            subject = %mail.subject,
            "SMTP not configured; email logged instead of sent"
        );
        tracing::debug!(body = %mail.text, "Email body");
        Ok(())
    }
}

/// SMTP mailer when `config` is present, otherwise [`LogMailer`].
///
/// # Errors
///
/// Returns error if the SMTP relay cannot be configured.
pub fn mailer_from_config(config: Option<&EmailConfig>) -> Result<Arc<dyn Mailer>, SmtpError> {
    match config {
        Some(config) => Ok(Arc::new(EmailService::new(config)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, emails will be logged instead of sent");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(feature = "test-support")]
pub use recording::RecordingMailer;

#[cfg(feature = "test-support")]
mod recording {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Email, EmailError, MailMessage, Mailer, RenderedMail, async_trait};

    /// Mailer that keeps every message it is asked to send.
    ///
    /// Messages are rendered first, so template errors surface in tests.
    #[derive(Debug, Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<(Email, RenderedMail, MailMessage)>>,
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl RecordingMailer {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` sends fail.
        pub fn fail_next(&self, count: usize) {
            self.failures_left.store(count, Ordering::SeqCst);
        }

        /// Messages delivered so far, oldest first.
        #[must_use]
        pub fn sent(&self) -> Vec<(Email, MailMessage)> {
            self.lock()
                .iter()
                .map(|(to, _, message)| (to.clone(), message.clone()))
                .collect()
        }

        /// Rendered mail delivered to `to`.
        #[must_use]
        pub fn rendered_for(&self, to: &Email) -> Vec<RenderedMail> {
            self.lock()
                .iter()
                .filter(|(recipient, _, _)| recipient == to)
                .map(|(_, rendered, _)| rendered.clone())
                .collect()
        }

        /// Number of send calls, including failed ones.
        #[must_use]
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Email, RenderedMail, MailMessage)>> {
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &Email, message: &MailMessage) -> Result<(), EmailError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let rendered = message.render()?;
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(EmailError::Delivery("simulated transport failure".to_owned()));
            }
            self.lock().push((to.clone(), rendered, message.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use orchard_core::{
        DeliveryAddress, OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity,
        StockLevel, UserId,
    };

    use super::*;
    use crate::models::{OrderItem, ProductSnapshot};

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(7),
            name: "Blood <Orange>".to_owned(),
            price: Price::new(Decimal::new(250, 2)).unwrap(),
            stock: StockLevel::new(10),
            category: "citrus".to_owned(),
            image_url: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_new_product_render_escapes_html_only() {
        let message = MailMessage::NewProduct {
            recipient_name: "Ada".to_owned(),
            product: product(),
            product_url: "https://orchard.example/products/7".to_owned(),
        };
        let mail = message.render().unwrap();
        assert_eq!(mail.subject, "New Product Available: Blood <Orange>");
        assert!(mail.text.contains("Blood <Orange> (citrus) - $2.50"));
        assert!(
            mail.html.contains("Blood &#60;Orange&#62;")
                || mail.html.contains("Blood &lt;Orange&gt;")
        );
    }

    #[test]
    fn test_status_changed_lists_lines() {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(42),
            user_id: UserId::new(1),
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: ProductId::new(7),
                quantity: Quantity::new(4).unwrap(),
                unit_price: Price::new(Decimal::new(250, 2)).unwrap(),
                product: Some(ProductSnapshot {
                    id: ProductId::new(7),
                    name: "Blood Orange".to_owned(),
                    category: "citrus".to_owned(),
                    image_url: None,
                    price: Price::new(Decimal::new(300, 2)).unwrap(),
                }),
            }],
            total_amount: Price::new(Decimal::new(1000, 2)).unwrap(),
            delivery_address: DeliveryAddress::new("1 Orchard Lane", "Appleton", "12345").unwrap(),
            status: OrderStatus::Shipped,
            created_at: now,
            updated_at: now,
        };
        let mail = MailMessage::StatusChanged {
            recipient_name: "Ada".to_owned(),
            order,
        }
        .render()
        .unwrap();

        assert_eq!(mail.subject, "Order #42 Status Updated - shipped");
        assert!(mail.text.contains("- Blood Orange: 4 x $2.50 = $10.00"));
        assert!(mail.text.contains("Total: $10.00"));
        assert!(mail.html.contains("Appleton"));
    }

    #[test]
    fn test_password_reset_contains_link() {
        let mail = MailMessage::PasswordReset {
            recipient_name: "Ada".to_owned(),
            reset_url: "https://orchard.example/reset-password?token=abc&email=a%40b.co".to_owned(),
        }
        .render()
        .unwrap();
        assert_eq!(mail.subject, "Reset Your Password - Orchard");
        assert!(
            mail.text
                .contains("https://orchard.example/reset-password?token=abc&email=a%40b.co")
        );
    }
}
