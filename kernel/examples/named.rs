use fibre_kernel::{resolve, Component, Kernel, NamingKey};
use std::sync::Arc;

// --- Abstraction and Implementations ---
trait MessageSender: Send + Sync {
  fn send(&self, to: &str, message: &str) -> String;
}

struct EmailSender;
impl MessageSender for EmailSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending email to {}: '{}'", to, message)
  }
}

struct SmsSender;
impl MessageSender for SmsSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending SMS to {}: '{}'", to, message)
  }
}

fn main() {
  let kernel = Kernel::new();

  // --- Registration ---
  // Both implementations share the `sender` contract name and differ by properties.
  kernel
    .register(
      Component::<EmailSender>::named("sender:channel=email")
        .service::<dyn MessageSender>(|it| it as Arc<dyn MessageSender>)
        .factory(|_| Ok(Arc::new(EmailSender))),
    )
    .unwrap();
  kernel
    .register(
      Component::<SmsSender>::named("sender:channel=sms,secure=true")
        .service::<dyn MessageSender>(|it| it as Arc<dyn MessageSender>)
        .factory(|_| Ok(Arc::new(SmsSender))),
    )
    .unwrap();
  kernel
    .add_named_query("secure-sender", NamingKey::parse("sender:secure=true,channel=sms").unwrap())
    .unwrap();

  // --- Resolution ---
  // A bare query picks the first registration; properties must match exactly.
  let default_sender = resolve!(kernel, trait MessageSender, "sender");
  let sms_sender = resolve!(kernel, trait MessageSender, "secure-sender");

  let result1 = default_sender.send("test@example.com", "Hello from Fibre!");
  let result2 = sms_sender.send("+123456789", "Hello from Fibre!");

  println!("{}", result1);
  println!("{}", result2);

  assert!(result1.contains("email"));
  assert!(result2.contains("SMS"));
}
