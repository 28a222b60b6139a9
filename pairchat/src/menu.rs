//! Interactive text menu over a [`SessionRegistry`].
//!
//! Lines come from an [`InputSource`] and text goes to a shared writer, so
//! the same menu drives a terminal in the binary and a byte buffer in
//! tests. While a conversation is open the input source belongs to its
//! outbound channel; the menu resumes reading when the conversation ends.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pairchat_proto::username::{NameError, validate_username};

use crate::chatlog::{self, ChatLogError};
use crate::session::channel::{ConversationEnd, InputSource, LEAVE_COMMAND};
use crate::session::{SessionError, SessionEvent, SessionRegistry};
use crate::theme::TextColor;
use crate::transport::Transport;

/// Writer shared between the menu and the event printer.
pub type SharedWriter<W> = Arc<Mutex<W>>;

fn write_line<W: Write>(out: &SharedWriter<W>, text: impl Display) -> io::Result<()> {
    let mut out = out.lock();
    writeln!(out, "{text}")?;
    out.flush()
}

fn write_prompt<W: Write>(out: &SharedWriter<W>, text: impl Display) -> io::Result<()> {
    let mut out = out.lock();
    write!(out, "{text}")?;
    out.flush()
}

async fn read_line(input: &InputSource) -> Option<String> {
    let line = input.lock().await.recv().await?;
    Some(line.trim().to_string())
}

fn describe_name_error(e: &NameError) -> String {
    match e {
        NameError::Reserved(name) => format!(
            "\"{name}\" can't be used as a name in order to share functionality with the GUI version."
        ),
        NameError::TooShort => "Your username should be at least 3 characters long.".to_string(),
        NameError::TooLong => "Your username should be at most 32 characters long.".to_string(),
        NameError::Whitespace => "Your username can't contain spaces.".to_string(),
        NameError::SelfContact => "You can't add yourself.".to_string(),
    }
}

/// Prompts until a valid username is entered.
///
/// Returns `Ok(None)` if the input closes first.
///
/// # Errors
///
/// Returns any I/O error from the writer.
pub async fn login<W: Write>(
    input: &InputSource,
    out: &SharedWriter<W>,
) -> io::Result<Option<String>> {
    write_line(out, "Please enter your login info below:\n")?;
    loop {
        write_prompt(out, "Username: ")?;
        let Some(name) = read_line(input).await else {
            return Ok(None);
        };
        match validate_username(&name) {
            Ok(()) => return Ok(Some(name)),
            Err(e) => write_line(out, format_args!("{} Try again.\n", describe_name_error(&e)))?,
        }
    }
}

/// Prints live session events while the menu runs.
pub fn spawn_event_printer<W>(
    mut events: mpsc::Receiver<SessionEvent>,
    out: SharedWriter<W>,
) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let written = match event {
                SessionEvent::Echo { line, .. } => write_line(&out, line),
                SessionEvent::ChannelFailed {
                    contact, reason, ..
                } => write_line(
                    &out,
                    format_args!("Lost the connection to {contact} ({reason})."),
                ),
                // The conversation reports this itself when it ends.
                SessionEvent::PeerUnreachable { contact } => {
                    tracing::debug!(contact, "peer unreachable");
                    Ok(())
                }
            };
            if let Err(e) = written {
                tracing::warn!(error = %e, "event printer stopped");
                break;
            }
        }
    })
}

/// The home menu.
pub struct Menu<T: Transport, W: Write> {
    registry: Arc<SessionRegistry<T>>,
    input: InputSource,
    out: SharedWriter<W>,
    chat_log_dir: PathBuf,
    color: TextColor,
}

impl<T: Transport, W: Write> Menu<T, W> {
    /// Creates a menu reading from `input` and writing to `out`.
    pub const fn new(
        registry: Arc<SessionRegistry<T>>,
        input: InputSource,
        out: SharedWriter<W>,
        chat_log_dir: PathBuf,
        color: TextColor,
    ) -> Self {
        Self {
            registry,
            input,
            out,
            chat_log_dir,
            color,
        }
    }

    /// Currently selected text colour.
    #[must_use]
    pub const fn color(&self) -> TextColor {
        self.color
    }

    fn say(&self, text: impl Display) -> io::Result<()> {
        write_line(&self.out, text)
    }

    async fn ask(&self, prompt: &str) -> io::Result<Option<String>> {
        write_prompt(&self.out, format_args!("\n{prompt}"))?;
        Ok(read_line(&self.input).await)
    }

    /// Runs until the user picks "exit" or the input closes.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the writer.
    pub async fn run(&mut self) -> io::Result<()> {
        self.say(format_args!("Welcome, {}.", self.registry.local_user()))?;
        loop {
            self.print_home()?;
            let Some(choice) = read_line(&self.input).await else {
                tracing::info!("input closed, leaving menu");
                return Ok(());
            };
            let keep_going = match choice.parse::<u8>() {
                Ok(1) => self.view_contacts().map(|()| true),
                Ok(2) => self.add_contact().await,
                Ok(3) => self.chat().await,
                Ok(4) => self.remove_contact().await,
                Ok(5) => self.save_chat_log().await,
                Ok(6) => self.change_color().await,
                Ok(7) => return Ok(()),
                _ => self
                    .say("\nThat's not an option. Try again. (1-7)")
                    .map(|()| true),
            }?;
            if !keep_going {
                return Ok(());
            }
        }
    }

    fn print_home(&self) -> io::Result<()> {
        self.say(
            "\nChoose an option from below:\n  \
             1. View list of currently connected users.\n  \
             2. Add a new user.\n  \
             3. Chat with a user.\n  \
             4. Remove a user.\n  \
             5. Save chat log.\n  \
             6. Change color of text.\n  \
             7. Exit the program.\n",
        )?;
        write_prompt(&self.out, "Select an option: ")
    }

    fn view_contacts(&self) -> io::Result<()> {
        let contacts = self.registry.list();
        if contacts.is_empty() {
            return self.say("\nYou have no users added yet.");
        }
        self.say("\nThese are the users you are currently connected to:")?;
        for (contact, presence) in contacts {
            self.say(format_args!("  {contact} ({presence})"))?;
        }
        Ok(())
    }

    // Each action returns `Ok(false)` when the input closed mid-prompt.

    async fn add_contact(&self) -> io::Result<bool> {
        let Some(contact) = self.ask("Enter new user: ").await? else {
            return Ok(false);
        };
        match self.registry.add(&contact).await {
            Ok(()) => self.say(format_args!("Successfully added {contact}."))?,
            Err(SessionError::InvalidName(e)) => {
                self.say(format_args!("{} Try again.", describe_name_error(&e)))?;
            }
            Err(SessionError::DuplicateContact(_)) => {
                self.say("You can't add a user you already added.")?;
            }
            Err(e) => self.say(format_args!("Could not add {contact}: {e}"))?,
        }
        Ok(true)
    }

    async fn chat(&self) -> io::Result<bool> {
        if self.registry.is_empty() {
            self.say("\nYou have no users added yet.")?;
            return Ok(true);
        }
        let Some(contact) = self.ask("What user would you like to chat to: ").await? else {
            return Ok(false);
        };
        if contact == self.registry.local_user() {
            self.say("Invalid username: can't talk to yourself.")?;
            return Ok(true);
        }
        let Ok(history) = self.registry.history_snapshot(&contact) else {
            self.say("Invalid username.")?;
            return Ok(true);
        };

        self.say(format_args!("\nHere's your current history with {contact}:"))?;
        if history.is_empty() {
            self.say(format_args!("This is the start of your history with {contact}."))?;
        }
        for line in &history {
            self.say(line)?;
        }
        self.say(format_args!("\n(type {LEAVE_COMMAND} to leave)"))?;

        match self
            .registry
            .enter_conversation(&contact, Arc::clone(&self.input))
            .await
        {
            Ok(ConversationEnd::Left) => {
                self.say(format_args!("Leaving chat with {contact}."))?;
            }
            Ok(ConversationEnd::PeerUnreachable) => {
                self.say("Other user is offline now. Last message discarded.")?;
            }
            Ok(ConversationEnd::ChannelClosed) | Err(SessionError::ChannelClosed(_)) => {
                self.say(format_args!("The connection to {contact} was lost."))?;
            }
            Err(e) => self.say(format_args!("Could not chat with {contact}: {e}"))?,
        }
        Ok(true)
    }

    async fn remove_contact(&self) -> io::Result<bool> {
        let Some(contact) = self.ask("What user would you like to remove: ").await? else {
            return Ok(false);
        };
        match self.registry.remove(&contact).await {
            Ok(()) => self.say(format_args!("{contact} has been successfully removed."))?,
            Err(SessionError::NotFound(_)) => self.say("Error: User was not found.")?,
            Err(e @ SessionError::DrainTimeout { .. }) => {
                self.say(format_args!("{e}. Try removing {contact} again."))?;
            }
            Err(e) => self.say(format_args!("Could not remove {contact}: {e}"))?,
        }
        Ok(true)
    }

    async fn save_chat_log(&self) -> io::Result<bool> {
        let Some(contact) = self
            .ask("Which ongoing chat would you like to save?: ")
            .await?
        else {
            return Ok(false);
        };
        let Ok(history) = self.registry.history_snapshot(&contact) else {
            self.say(format_args!(
                "You aren't currently chatting with a user named {contact}."
            ))?;
            return Ok(true);
        };
        match chatlog::export(
            &self.chat_log_dir,
            self.registry.local_user(),
            &contact,
            &history,
            chrono::Local::now(),
        ) {
            Ok(path) => self.say(format_args!("File {} was created.", path.display()))?,
            Err(ChatLogError::EmptyHistory(_)) => self.say(format_args!(
                "You've added {contact}, but you haven't chatted with them yet."
            ))?,
            Err(e) => {
                tracing::error!(error = %e, "chat log not saved");
                self.say(format_args!("Error creating chat log file: {e}"))?;
            }
        }
        Ok(true)
    }

    async fn change_color(&mut self) -> io::Result<bool> {
        self.say("\nWhich color would you like to choose?")?;
        for (i, color) in TextColor::ALL.iter().enumerate() {
            self.say(format_args!("  {}. {color}", i + 1))?;
        }
        let Some(choice) = self.ask("Select an option: ").await? else {
            return Ok(false);
        };
        match choice.parse().ok().and_then(TextColor::from_choice) {
            Some(color) => {
                self.color = color;
                {
                    let mut out = self.out.lock();
                    color.apply(&mut *out)?;
                    out.flush()?;
                }
                self.say(format_args!("Your display is now set to {color}."))?;
            }
            None => self.say("That's not a color.")?,
        }
        Ok(true)
    }
}
