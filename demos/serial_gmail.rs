use cellmail::{at::serial::SerialPortLink, ModemMailer};

fn main() {
    tracing_subscriber::fmt::init();

    let link = SerialPortLink::open("/dev/ttyUSB0", 115_200).unwrap();

    // Gmail over implicit TLS, the modem terminates it
    let mut mailer = ModemMailer::builder(link)
        .apn("internet")
        .relay("smtp.gmail.com", 465)
        .build();
    mailer.set_auth("smtp_username@gmail.com", "app_password");
    mailer.set_recipient("hei@domain.tld", "Hei");
    mailer.set_from_name("Tank Sensor");
    mailer.set_subject("Happy new year");
    mailer.set_body("Be happy!");

    match mailer.try_send_email() {
        Ok(_) => println!("Email sent successfully!"),
        Err(e) => panic!("Could not send email: {e:?}"),
    }
}
