pub mod dedupe;
pub mod executor;
pub mod extraction;
pub mod imaging;
pub mod ocr;
pub mod pipeline;
pub mod progression;
pub mod replies;
pub mod sealing;
pub mod storage;
pub mod twilio;
pub mod validation;
