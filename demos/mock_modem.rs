use cellmail::{at::mock::MockModem, ModemMailer};

fn main() {
    tracing_subscriber::fmt::init();

    let modem = MockModem::new();
    let mut mailer = ModemMailer::builder(modem.clone())
        .relay("smtp.example.com", 465)
        .build();
    mailer.set_auth("user@example.com", "app-pass");
    mailer.set_recipient("dest@example.com", "Dest");
    mailer.set_subject("Tank level");
    mailer.set_body("Level is low.\nRefill soon.");

    match mailer.try_send_email() {
        Ok(response) => println!("Email sent successfully: {response}"),
        Err(e) => panic!("Could not send email: {e:?}"),
    }
    println!("{} AT commands exchanged", modem.commands().len());
}
