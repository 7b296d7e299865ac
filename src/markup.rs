//! Control markup returned to the telephony provider. Each variant is a
//! pure function from parameters to the `text/xml` wire format; none of
//! them touch live call state.

pub const CONTENT_TYPE: &str = "text/xml";
const DIGIT_COUNT: u32 = 5;
const GATHER_TIMEOUT_SECS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMarkup {
    /// Greet the inbound caller and gather the call code from the keypad.
    Prompt { action_url: String },
    /// Drop the caller into the conference named for their code.
    JoinConference {
        status_callback_url: String,
        call_code: u32,
    },
    /// Redirect a leg to play the stored message.
    PlayAudio { audio_url: String },
    /// Cut playback by announcing a short silence.
    Silence,
    /// Unknown code: apologize and end the call.
    Hangup,
}

pub fn conference_name(call_code: u32) -> String {
    format!("call-{}", call_code)
}

/// Parses the code back out of a conference friendly name, as minted by
/// [`conference_name`].
pub fn parse_conference_code(friendly_name: &str) -> Option<u32> {
    friendly_name.split('-').nth(1)?.parse().ok()
}

impl ControlMarkup {
    pub fn to_xml(&self) -> String {
        let body = match self {
            ControlMarkup::Prompt { action_url } => format!(
                "<Gather numDigits=\"{}\" timeout=\"{}\" action=\"{}\" method=\"POST\">\
                 <Say>Thank you for calling. Enter your {} digit call code using the keypad.</Say>\
                 </Gather>",
                DIGIT_COUNT,
                GATHER_TIMEOUT_SECS,
                escape_xml(action_url),
                DIGIT_COUNT,
            ),
            ControlMarkup::JoinConference {
                status_callback_url,
                call_code,
            } => format!(
                "<Say>Connecting you now</Say>\
                 <Dial><Conference beep=\"false\" startConferenceOnEnter=\"true\" \
                 endConferenceOnExit=\"true\" statusCallback=\"{}\" \
                 statusCallbackEvent=\"start join end\">{}</Conference></Dial>",
                escape_xml(status_callback_url),
                conference_name(*call_code),
            ),
            ControlMarkup::PlayAudio { audio_url } => {
                format!("<Play>{}</Play>", escape_xml(audio_url))
            }
            ControlMarkup::Silence => "<Pause length=\"1\"/>".to_string(),
            ControlMarkup::Hangup => {
                "<Say>Input was incorrect. Goodbye.</Say><Hangup/>".to_string()
            }
        };
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{}</Response>",
            body
        )
    }
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
